//! Two-phase dispatcher: drives the multi-product schedule. Phase 1
//! handles products required by urgent OTs (due ≤ 40h); phase 2 handles the
//! rest. Within each phase, product groups are processed in ascending due
//! date, ties broken by product id.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::config::{ScheduleConfig, EPSILON, URGENT_THRESHOLD_HOURS};
use crate::decompose::{decompose, ProductTask};
use crate::distribute::distribute;
use crate::model::{Block, MachineState, ProductionBlock, SetupBlock, WorkOrder};

#[derive(Debug, Clone, Default)]
struct OtProgress {
    completion: f64,
    produced: BTreeMap<String, u64>,
}

pub struct DispatchResult {
    pub blocks: Vec<Block>,
    pub ot_due: BTreeMap<String, f64>,
    pub ot_cluster: BTreeMap<String, u32>,
    pub ot_completion: BTreeMap<String, f64>,
    pub ot_produced: BTreeMap<String, BTreeMap<String, u64>>,
    pub ot_requirements: BTreeMap<String, BTreeMap<String, u64>>,
}

pub fn run(
    orders: &[WorkOrder],
    machines: &mut BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    config: &ScheduleConfig,
) -> DispatchResult {
    let decomposition = decompose(orders);

    let mut ot_due = BTreeMap::new();
    let mut ot_cluster = BTreeMap::new();
    for order in orders {
        ot_due.insert(order.id.clone(), order.due);
        ot_cluster.insert(order.id.clone(), order.cluster);
    }

    let (urgent, normal): (Vec<ProductTask>, Vec<ProductTask>) = decomposition
        .tasks
        .into_iter()
        .partition(|task| task.ot_due <= URGENT_THRESHOLD_HOURS);

    let mut blocks = Vec::new();
    let mut progress: BTreeMap<String, OtProgress> = BTreeMap::new();

    log::debug!("phase1: dispatching {} urgent product tasks", urgent.len());
    run_phase(
        &urgent,
        machines,
        setup_times,
        config.default_setup_time,
        &mut blocks,
        &mut progress,
        "phase1",
    );
    log::debug!("phase2: dispatching {} remaining product tasks", normal.len());
    run_phase(
        &normal,
        machines,
        setup_times,
        config.default_setup_time,
        &mut blocks,
        &mut progress,
        "phase2",
    );

    for block in &mut blocks {
        if let Block::Production(production) = block {
            production.on_time = production.ot_ids.iter().all(|ot_id| {
                let completion = progress
                    .get(ot_id)
                    .map_or(f64::NEG_INFINITY, |p| p.completion);
                let due = ot_due.get(ot_id).copied().unwrap_or(f64::INFINITY);
                completion <= due + EPSILON
            });
            if !production.on_time {
                log::warn!(
                    "product `{}` on machine `{}` completes after due date for at least one OT",
                    production.product,
                    production.machine
                );
            }
        }
    }

    let mut ot_completion = BTreeMap::new();
    let mut ot_produced = BTreeMap::new();
    for (id, p) in progress {
        ot_completion.insert(id.clone(), p.completion);
        ot_produced.insert(id, p.produced);
    }

    DispatchResult {
        blocks,
        ot_due,
        ot_cluster,
        ot_completion,
        ot_produced,
        ot_requirements: decomposition.ot_requirements,
    }
}

fn run_phase(
    tasks: &[ProductTask],
    machines: &mut BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    default_setup_time: f64,
    blocks: &mut Vec<Block>,
    progress: &mut BTreeMap<String, OtProgress>,
    phase_label: &str,
) {
    let mut groups: BTreeMap<String, Vec<&ProductTask>> = BTreeMap::new();
    for task in tasks {
        groups.entry(task.product.clone()).or_default().push(task);
    }

    let mut ordered: Vec<(String, f64, Vec<&ProductTask>)> = groups
        .into_iter()
        .map(|(product, group)| {
            let due_p = group
                .iter()
                .map(|task| task.ot_due)
                .fold(f64::INFINITY, f64::min);
            (product, due_p, group)
        })
        .collect();
    ordered.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0)));

    for (product, due_p, group) in ordered {
        let total_qty: u64 = group.iter().map(|task| task.quantity).sum();
        log::debug!(
            "{phase_label}: product `{product}` (due {due_p}) quantity {total_qty} across {} OTs",
            group.len()
        );

        let distribution = distribute(&product, total_qty, machines, setup_times, default_setup_time);

        // Lay the group's per-OT demand out as one partition of [0, total_qty)
        // (in group order) and the distribution's per-machine quantities as
        // another partition of the same range (in machine order). Crediting
        // each (task, machine) pair with the length of its interval overlap
        // gives integer shares whose sums are exact on *both* margins: every
        // machine's credited total equals its assigned quantity, and every
        // OT's credited total equals its demand. Splitting each machine's
        // quantity independently via `proportional_integer_split` per
        // assignment does not have this property — the same OT can be
        // rounded down on every machine it appears on, under-crediting its
        // total demand even though the group as a whole produced enough.
        let mut task_starts = Vec::with_capacity(group.len());
        let mut task_cursor = 0u64;
        for task in &group {
            task_starts.push(task_cursor);
            task_cursor += task.quantity;
        }

        let mut machine_cursor = 0u64;
        for assignment in &distribution.assignments {
            let machine_start = machine_cursor;
            let machine_end = machine_start + assignment.qty;
            machine_cursor = machine_end;

            if assignment.setup > EPSILON {
                let machine = machines
                    .get(&assignment.machine)
                    .expect("distribution references a known machine");
                blocks.push(Block::Setup(SetupBlock {
                    machine: machine.name.clone(),
                    start: machine.available_at,
                    end: machine.available_at + assignment.setup,
                    format: product.clone(),
                }));
            }

            let mut ot_ids: Vec<String> = Vec::new();
            for (task, &task_start) in group.iter().zip(task_starts.iter()) {
                let task_end = task_start + task.quantity;
                let overlap_start = task_start.max(machine_start);
                let overlap_end = task_end.min(machine_end);
                if overlap_end <= overlap_start {
                    continue;
                }
                let share = overlap_end - overlap_start;
                ot_ids.push(task.ot_id.clone());
                let entry = progress.entry(task.ot_id.clone()).or_default();
                entry.completion = entry.completion.max(assignment.end);
                *entry.produced.entry(product.clone()).or_insert(0) += share;
            }
            let ot_ids: Vec<String> = ot_ids.into_iter().sorted().dedup().collect();

            blocks.push(Block::Production(ProductionBlock {
                machine: assignment.machine.clone(),
                start: assignment.start,
                end: assignment.end,
                product: product.clone(),
                quantity: assignment.qty,
                ot_ids,
                on_time: true,
                id: None,
                due: None,
                qty_cliente: None,
                qty_extra: None,
            }));

            let machine = machines
                .get_mut(&assignment.machine)
                .expect("distribution references a known machine");
            machine.available_at = assignment.end;
            machine.last_format = Some(product.clone());
        }
    }
}
