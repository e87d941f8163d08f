//! Parallel-distribution evaluator: decides whether a product's
//! total demand is produced on a single machine or split across several,
//! by comparing the makespan of each option under the current machine
//! states.

use std::collections::BTreeMap;

use crate::config::EPSILON;
use crate::model::MachineState;
use crate::setup::setup_time;

/// One machine's share of a distributed quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub machine: String,
    pub qty: u64,
    pub setup: f64,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub assignments: Vec<Assignment>,
    pub makespan: f64,
}

/// Splits `total` across `weights` proportionally, rounding to integers
/// while preserving the exact sum. Residual units go to the entries with
/// the largest fractional remainder first; ties are broken by ascending
/// index, which callers arrange to correspond to a stable identifier order.
pub fn proportional_integer_split(total: u64, weights: &[f64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        let mut out = vec![0u64; weights.len()];
        out[0] = total;
        return out;
    }

    let raw: Vec<f64> = weights
        .iter()
        .map(|w| total as f64 * w / weight_sum)
        .collect();
    distribute_rounded(total, &raw)
}

/// Rounds a set of real-valued targets to integers that sum exactly to
/// `total`, using largest-remainder distribution of the residual.
fn distribute_rounded(total: u64, raw: &[f64]) -> Vec<u64> {
    let mut floors: Vec<u64> = raw.iter().map(|r| r.max(0.0).floor() as u64).collect();
    let assigned: u64 = floors.iter().sum();
    let mut residual = total.saturating_sub(assigned);

    let mut fracs: Vec<(usize, f64)> = raw.iter().enumerate().map(|(i, r)| (i, r.fract())).collect();
    fracs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));

    let mut i = 0;
    while residual > 0 && !fracs.is_empty() {
        floors[fracs[i % fracs.len()].0] += 1;
        residual -= 1;
        i += 1;
    }
    floors
}

/// Evaluates both options for producing `quantity` units of `product` and
/// returns the one selected by the tolerance-and-improvement rule: the
/// parallel split wins only if it stays within 10% of the single-machine
/// makespan, and either improves on it by at least 5% or the batch is large.
pub fn distribute(
    product: &str,
    quantity: u64,
    machines: &BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    default_setup_time: f64,
) -> Distribution {
    let option_a = single_machine(product, quantity, machines, setup_times, default_setup_time);

    if machines.len() < 2 {
        return option_a;
    }

    let option_b = parallel_split(product, quantity, machines, setup_times, default_setup_time);

    let within_tolerance = option_b.makespan <= option_a.makespan * 1.10 + EPSILON;
    let strictly_better = option_b.makespan <= option_a.makespan * 0.95 + EPSILON;
    let large_batch = quantity > 1000;

    if within_tolerance && (strictly_better || large_batch) {
        option_b
    } else {
        option_a
    }
}

/// Option A: produce the whole quantity on whichever single machine
/// finishes soonest. Ties go to the lexicographically first machine name,
/// which falls out naturally from iterating the sorted `BTreeMap` and only
/// replacing the incumbent on a strict improvement.
fn single_machine(
    product: &str,
    quantity: u64,
    machines: &BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    default_setup_time: f64,
) -> Distribution {
    let mut best: Option<Assignment> = None;

    for machine in machines.values() {
        let setup = setup_time(
            machine.last_format.as_deref(),
            product,
            setup_times,
            default_setup_time,
        );
        let start = machine.available_at + setup;
        let end = start + quantity as f64 / machine.capacity;

        let improves = match &best {
            None => true,
            Some(incumbent) => end < incumbent.end - EPSILON,
        };
        if improves {
            best = Some(Assignment {
                machine: machine.name.clone(),
                qty: quantity,
                setup,
                start,
                end,
            });
        }
    }

    let assignment = best.expect("distribute is never called with an empty machine set");
    let makespan = assignment.end;
    Distribution {
        assignments: vec![assignment],
        makespan,
    }
}

/// Option B: water-fill the quantity across every machine so that
/// participating machines finish at (approximately) the same time,
/// weighted by capacity and offset by each machine's current availability
/// and setup cost to reach `product`.
fn parallel_split(
    product: &str,
    quantity: u64,
    machines: &BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    default_setup_time: f64,
) -> Distribution {
    struct Candidate {
        name: String,
        available_at: f64,
        setup: f64,
        capacity: f64,
    }

    let candidates: Vec<Candidate> = machines
        .values()
        .map(|machine| {
            let setup = setup_time(
                machine.last_format.as_deref(),
                product,
                setup_times,
                default_setup_time,
            );
            Candidate {
                name: machine.name.clone(),
                available_at: machine.available_at,
                setup,
                capacity: machine.capacity,
            }
        })
        .collect();

    let base: Vec<f64> = candidates
        .iter()
        .map(|c| c.available_at + c.setup)
        .collect();
    let quantity_f = quantity as f64;

    let produced_at = |t: f64| -> f64 {
        candidates
            .iter()
            .zip(base.iter())
            .map(|(c, &b)| (c.capacity * (t - b)).max(0.0))
            .sum()
    };

    let min_base = base.iter().copied().fold(f64::INFINITY, f64::min);
    let mut lo = min_base;
    let mut hi = min_base + 1.0;
    while produced_at(hi) < quantity_f {
        hi = min_base + (hi - min_base) * 2.0;
    }
    for _ in 0..200 {
        let mid = (lo + hi) / 2.0;
        if produced_at(mid) < quantity_f {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let t = hi;

    let raw_qty: Vec<f64> = candidates
        .iter()
        .zip(base.iter())
        .map(|(c, &b)| (c.capacity * (t - b)).max(0.0))
        .collect();
    let qty = distribute_rounded(quantity, &raw_qty);

    let mut assignments: Vec<Assignment> = candidates
        .iter()
        .zip(base.iter())
        .zip(qty.iter())
        .filter_map(|((c, &b), &q)| {
            if q == 0 {
                return None;
            }
            Some(Assignment {
                machine: c.name.clone(),
                qty: q,
                setup: c.setup,
                start: b,
                end: b + q as f64 / c.capacity,
            })
        })
        .collect();

    if assignments.is_empty() {
        // Degenerate water-fill (e.g. a single machine with capacity so
        // small relative to the others that rounding starved it): fall
        // back to single-machine behavior rather than emit nothing.
        return single_machine(product, quantity, machines, setup_times, default_setup_time);
    }

    assignments.sort_by(|a, b| a.machine.cmp(&b.machine));
    let makespan = assignments
        .iter()
        .map(|a| a.end)
        .fold(f64::NEG_INFINITY, f64::max);

    Distribution {
        assignments,
        makespan,
    }
}
