//! Heuristic production scheduler for work orders ("OTs") across
//! non-identical parallel machines with sequence-dependent setup costs.
//!
//! [`schedule`] is the crate's single entry point: a pure function from an
//! input document to a time-ordered schedule plus an on-time/late summary.
//! It accepts two OT dialects (a `products` map, or the legacy single
//! `format`/`qty` pair) and picks between the two-phase heuristic
//! dispatcher and the legacy aprovechamiento policy based on which dialect
//! the whole batch uses.

pub mod config;
pub mod decompose;
pub mod dispatch;
pub mod distribute;
pub mod error;
pub mod legacy;
pub mod model;
pub mod setup;
mod verify;

use std::collections::BTreeMap;

pub use config::ScheduleConfig;
pub use error::{Result, ScheduleError};
pub use model::{
    Atraso, Block, MachineInput, ProductionBlock, ScheduleInput, ScheduleOutput, SetupBlock,
    Summary, WorkOrderInput,
};

use model::{build_machine_states, canonicalize_orders, is_legacy_batch, validate_input};

/// Computes a full production schedule for `input`.
///
/// Returns `Ok` with a complete, invariant-respecting schedule, or `Err` if
/// the input is malformed (`ScheduleError::InvalidInput`) or the computed
/// schedule itself violates an internal invariant
/// (`ScheduleError::Internal`, which indicates a bug in this crate). An OT
/// missing its due date is never an error: it is reported in
/// `summary.atrasos` and its blocks carry `on_time = false`.
pub fn schedule(input: ScheduleInput) -> Result<ScheduleOutput> {
    validate_input(&input)?;

    let mut machines = build_machine_states(&input.machines);
    let initial_last_format: BTreeMap<String, Option<String>> = machines
        .iter()
        .map(|(name, m)| (name.clone(), m.last_format.clone()))
        .collect();

    let legacy = is_legacy_batch(&input.orders);
    log::debug!(
        "dispatching {} orders across {} machines via the {} path",
        input.orders.len(),
        machines.len(),
        if legacy { "legacy aprovechamiento" } else { "two-phase" }
    );

    let orders = canonicalize_orders(&input.orders)?;

    let (mut blocks, ot_due, ot_cluster, ot_completion, ot_produced, ot_requirements, qty_total_extra, horizonte_usado) =
        if legacy {
            let result = legacy::run(&orders, &mut machines, &input.setup_times, &input.config);
            (
                result.blocks,
                result.ot_due,
                result.ot_cluster,
                result.ot_completion,
                result.ot_produced,
                result.ot_requirements,
                result.qty_total_extra,
                result.horizonte_usado,
            )
        } else {
            let result = dispatch::run(&orders, &mut machines, &input.setup_times, &input.config);
            (
                result.blocks,
                result.ot_due,
                result.ot_cluster,
                result.ot_completion,
                result.ot_produced,
                result.ot_requirements,
                0,
                0.0,
            )
        };

    verify::verify_schedule(&blocks, &initial_last_format, &ot_requirements, &ot_produced)?;

    order_blocks(&mut blocks);

    let summary = build_summary(
        &orders,
        &blocks,
        &ot_due,
        &ot_cluster,
        &ot_completion,
        qty_total_extra,
        horizonte_usado,
    );
    let schedule_by_machine = group_by_machine(&blocks);

    Ok(ScheduleOutput {
        schedule: blocks,
        schedule_by_machine,
        summary,
    })
}

/// Orders the flat schedule by start time, ties broken by machine name, per
/// §6. Blocks are emitted in dispatch order (phase, then product due date),
/// not start-time order: a later-emitted block on a machine untouched by an
/// earlier phase can start before blocks already pushed for that phase.
/// `schedule_by_machine` does not need this — it re-sorts per machine
/// independently in `group_by_machine`.
fn order_blocks(blocks: &mut [Block]) {
    blocks.sort_by(|a, b| {
        a.start()
            .partial_cmp(&b.start())
            .unwrap()
            .then_with(|| a.machine().cmp(b.machine()))
    });
}

fn group_by_machine(blocks: &[Block]) -> BTreeMap<String, Vec<Block>> {
    let mut grouped: BTreeMap<String, Vec<Block>> = BTreeMap::new();
    for block in blocks {
        grouped
            .entry(block.machine().to_string())
            .or_default()
            .push(block.clone());
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| {
            a.start()
                .partial_cmp(&b.start())
                .unwrap()
                .then_with(|| a.machine().cmp(b.machine()))
        });
    }
    grouped
}

fn build_summary(
    orders: &[model::WorkOrder],
    blocks: &[Block],
    ot_due: &BTreeMap<String, f64>,
    ot_cluster: &BTreeMap<String, u32>,
    ot_completion: &BTreeMap<String, f64>,
    qty_total_extra: u64,
    horizonte_usado: f64,
) -> Summary {
    let total_setups = blocks.iter().filter(|b| matches!(b, Block::Setup(_))).count();
    let total_horas = blocks
        .iter()
        .map(Block::end)
        .fold(0.0_f64, f64::max);

    let qty_total_cliente: u64 = orders
        .iter()
        .flat_map(|o| {
            if o.is_legacy {
                let (_, qty) = o.legacy_format_qty();
                vec![qty]
            } else {
                o.products.values().copied().collect()
            }
        })
        .sum();

    let mut atrasos: Vec<Atraso> = Vec::new();
    for (ot_id, &due) in ot_due {
        let completion = ot_completion.get(ot_id).copied().unwrap_or(0.0);
        if completion > due + config::EPSILON {
            atrasos.push(Atraso {
                ot_id: ot_id.clone(),
                atraso_horas: completion - due,
                cluster: ot_cluster.get(ot_id).copied().unwrap_or(1),
                due,
                completion,
            });
        }
    }
    atrasos.sort_by(|a, b| a.ot_id.cmp(&b.ot_id));

    Summary {
        total_ots: orders.len(),
        total_setups,
        total_horas,
        qty_total_cliente,
        qty_total_extra,
        atrasos,
        horizonte_usado,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{MachineInput, WorkOrderInput};

    fn machine(capacity: f64) -> MachineInput {
        MachineInput {
            capacity,
            available_at: 0.0,
            last_format: None,
        }
    }

    fn production_at(machine: &str, start: f64, end: f64) -> Block {
        Block::Production(ProductionBlock {
            machine: machine.to_string(),
            start,
            end,
            product: "A".to_string(),
            quantity: 1,
            ot_ids: vec!["OT1".to_string()],
            on_time: true,
            id: None,
            due: None,
            qty_cliente: None,
            qty_extra: None,
        })
    }

    #[test]
    fn order_blocks_sorts_by_start_then_machine() {
        // Emission order (e.g. phase1 on L2, then phase2 on L1 starting
        // earlier because L1 was untouched in phase1) is not start order.
        let mut blocks = vec![
            production_at("L2", 0.0, 5.0),
            production_at("L1", 0.0, 3.0),
            production_at("L3", 2.0, 4.0),
        ];
        order_blocks(&mut blocks);
        let starts_and_machines: Vec<(f64, &str)> = blocks
            .iter()
            .map(|b| (b.start(), b.machine()))
            .collect();
        assert_eq!(
            starts_and_machines,
            vec![(0.0, "L1"), (0.0, "L2"), (2.0, "L3")]
        );
    }

    #[test]
    fn s1_single_ot_single_machine() {
        let input = ScheduleInput {
            orders: vec![WorkOrderInput {
                id: "OT1".to_string(),
                due: 12.0,
                cluster: 5,
                products: Some(BTreeMap::from([("A".to_string(), 800)])),
                format: None,
                qty: None,
            }],
            machines: BTreeMap::from([("L1".to_string(), machine(120.0))]),
            setup_times: BTreeMap::new(),
            config: ScheduleConfig::default(),
        };

        let output = schedule(input).unwrap();
        assert_eq!(output.schedule.len(), 1);
        assert_eq!(output.summary.total_setups, 0);
        assert!(output.summary.atrasos.is_empty());
        assert!((output.summary.total_horas - 800.0 / 120.0).abs() < 1e-6);
    }

    #[test]
    fn s2_legacy_two_ots_different_formats() {
        let input = ScheduleInput {
            orders: vec![
                WorkOrderInput {
                    id: "OT1".to_string(),
                    due: 12.0,
                    cluster: 5,
                    products: None,
                    format: Some("A".to_string()),
                    qty: Some(800),
                },
                WorkOrderInput {
                    id: "OT2".to_string(),
                    due: 18.0,
                    cluster: 4,
                    products: None,
                    format: Some("B".to_string()),
                    qty: Some(500),
                },
            ],
            machines: BTreeMap::from([("L1".to_string(), machine(120.0))]),
            setup_times: BTreeMap::from([("A-B".to_string(), 1.5)]),
            config: ScheduleConfig::default(),
        };

        let output = schedule(input).unwrap();
        assert_eq!(output.summary.total_setups, 1);
        assert!(output.summary.atrasos.is_empty());
    }

    #[test]
    fn s4_infeasible_due_is_reported_not_rejected() {
        let input = ScheduleInput {
            orders: vec![WorkOrderInput {
                id: "OT9".to_string(),
                due: 1.0,
                cluster: 1,
                products: Some(BTreeMap::from([("A".to_string(), 10000)])),
                format: None,
                qty: None,
            }],
            machines: BTreeMap::from([("L1".to_string(), machine(100.0))]),
            setup_times: BTreeMap::new(),
            config: ScheduleConfig::default(),
        };

        let output = schedule(input).unwrap();
        assert_eq!(output.summary.atrasos.len(), 1);
        assert!((output.summary.atrasos[0].atraso_horas - 99.0).abs() < 1e-6);
    }

    #[test]
    fn determinism_same_input_same_output() {
        let make_input = || ScheduleInput {
            orders: vec![
                WorkOrderInput {
                    id: "OT0".to_string(),
                    due: 20.0,
                    cluster: 5,
                    products: Some(BTreeMap::from([("A".to_string(), 200), ("B".to_string(), 300)])),
                    format: None,
                    qty: None,
                },
                WorkOrderInput {
                    id: "OT1".to_string(),
                    due: 20.0,
                    cluster: 4,
                    products: Some(BTreeMap::from([("B".to_string(), 250), ("C".to_string(), 150)])),
                    format: None,
                    qty: None,
                },
            ],
            machines: BTreeMap::from([
                ("L1".to_string(), machine(120.0)),
                ("L2".to_string(), machine(90.0)),
            ]),
            setup_times: BTreeMap::from([
                ("A-B".to_string(), 1.0),
                ("A-C".to_string(), 1.5),
                ("B-A".to_string(), 1.5),
                ("B-C".to_string(), 1.0),
                ("C-A".to_string(), 2.0),
                ("C-B".to_string(), 1.0),
            ]),
            config: ScheduleConfig::default(),
        };

        let first = schedule(make_input()).unwrap();
        let second = schedule(make_input()).unwrap();
        assert_eq!(
            serde_json::to_string(&first.schedule).unwrap(),
            serde_json::to_string(&second.schedule).unwrap()
        );
    }

    #[test]
    fn rejects_empty_orders() {
        let input = ScheduleInput {
            orders: vec![],
            machines: BTreeMap::from([("L1".to_string(), machine(100.0))]),
            setup_times: BTreeMap::new(),
            config: ScheduleConfig::default(),
        };
        assert!(matches!(schedule(input), Err(ScheduleError::InvalidInput { .. })));
    }
}
