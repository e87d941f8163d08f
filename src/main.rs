use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ot_line_scheduler::model::validate_input;
use ot_line_scheduler::{schedule, ScheduleInput};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Computes a production schedule from an input document.
    Schedule {
        /// Path to a JSON input document, or `-` for stdin.
        #[arg(short, long)]
        input: String,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,

        /// Print `schedule_by_machine` instead of the flat `schedule` list.
        #[arg(long)]
        by_machine: bool,
    },
    /// Runs only the defensive input checks, without dispatching.
    Validate {
        /// Path to a JSON input document, or `-` for stdin.
        #[arg(short, long)]
        input: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Schedule {
            input,
            pretty,
            by_machine,
        } => run_schedule(input, *pretty, *by_machine),
        Commands::Validate { input } => run_validate(input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn read_input_document(path: &str) -> Result<ScheduleInput, String> {
    let raw = if path == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| format!("could not read stdin: {e}"))?;
        buffer
    } else {
        fs::read_to_string(path).map_err(|e| format!("could not read `{path}`: {e}"))?
    };

    serde_json::from_str(&raw).map_err(|e| format!("could not parse input document: {e}"))
}

fn run_schedule(input_path: &str, pretty: bool, by_machine: bool) -> Result<(), String> {
    let input = read_input_document(input_path)?;
    log::info!("loaded input document from `{input_path}`");

    let output = schedule(input).map_err(|e| e.to_string())?;

    let rendered = if by_machine {
        if pretty {
            serde_json::to_string_pretty(&output.schedule_by_machine)
        } else {
            serde_json::to_string(&output.schedule_by_machine)
        }
    } else if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .map_err(|e| format!("could not render output: {e}"))?;

    println!("{rendered}");
    Ok(())
}

fn run_validate(input_path: &str) -> Result<(), String> {
    let input = read_input_document(input_path)?;
    validate_input(&input).map_err(|e| e.to_string())?;
    println!("ok: input document is well-formed");
    Ok(())
}
