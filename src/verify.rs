//! Post-pass invariant checks over an emitted schedule. A violation here
//! indicates a bug in the dispatcher, not bad input; rather than letting
//! that manifest as a panic deep in a caller's request path, `verify`
//! returns a `ScheduleError::Internal` so no partial schedule is ever
//! returned, even when the core itself is broken.

use std::collections::BTreeMap;

use crate::config::EPSILON;
use crate::error::{Result, ScheduleError};
use crate::model::Block;

/// Checks that blocks never overlap, that every setup is necessary and
/// every format change is preceded by one, and that every OT's demand was
/// fully satisfied. `ot_produced` is the dispatcher's own authoritative
/// record of what it credited to each OT; verification cross-checks it
/// against `ot_requirements` rather than re-deriving per-OT shares from the
/// blocks, which would have to reimplement the dispatcher's split logic to
/// be exact.
pub fn verify_schedule(
    blocks: &[Block],
    initial_last_format: &BTreeMap<String, Option<String>>,
    ot_requirements: &BTreeMap<String, BTreeMap<String, u64>>,
    ot_produced: &BTreeMap<String, BTreeMap<String, u64>>,
) -> Result<()> {
    verify_no_overlap(blocks)?;
    verify_setup_correctness(blocks, initial_last_format)?;
    verify_demand_satisfied(ot_requirements, ot_produced)?;
    Ok(())
}

fn by_machine(blocks: &[Block]) -> BTreeMap<&str, Vec<&Block>> {
    let mut grouped: BTreeMap<&str, Vec<&Block>> = BTreeMap::new();
    for block in blocks {
        grouped.entry(block.machine()).or_default().push(block);
    }
    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.start().partial_cmp(&b.start()).unwrap());
    }
    grouped
}

fn verify_no_overlap(blocks: &[Block]) -> Result<()> {
    for (machine, group) in by_machine(blocks) {
        for window in group.windows(2) {
            let (prev, next) = (window[0], window[1]);
            if next.start() < prev.end() - EPSILON {
                return Err(ScheduleError::internal(
                    "no_overlap",
                    format!(
                        "machine `{machine}` has overlapping blocks [{}, {}) and [{}, {})",
                        prev.start(),
                        prev.end(),
                        next.start(),
                        next.end()
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn verify_setup_correctness(
    blocks: &[Block],
    initial_last_format: &BTreeMap<String, Option<String>>,
) -> Result<()> {
    for (machine, group) in by_machine(blocks) {
        let mut prev_product: Option<String> = initial_last_format.get(machine).cloned().flatten();
        let mut prev_end: Option<f64> = None;

        for block in group {
            match block {
                Block::Setup(setup) => {
                    if let Some(prev_product) = &prev_product {
                        if prev_product == &setup.format {
                            return Err(ScheduleError::internal(
                                "no_spurious_setup",
                                format!(
                                    "machine `{machine}` has a spurious setup to `{}`",
                                    setup.format
                                ),
                            ));
                        }
                    }
                    if let Some(end) = prev_end {
                        if (setup.start - end).abs() > EPSILON {
                            return Err(ScheduleError::internal(
                                "no_overlap",
                                format!("machine `{machine}` has a gap before its setup block"),
                            ));
                        }
                    }
                    prev_end = Some(setup.end);
                }
                Block::Production(production) => {
                    let needs_setup = prev_product.as_deref() != Some(production.product.as_str());
                    if needs_setup {
                        let preceded_by_matching_setup = prev_end
                            .map(|end| (end - production.start).abs() <= EPSILON)
                            .unwrap_or(false);
                        if !preceded_by_matching_setup {
                            return Err(ScheduleError::internal(
                                "setup_required",
                                format!(
                                    "machine `{machine}` produces `{}` without a preceding setup",
                                    production.product
                                ),
                            ));
                        }
                    }
                    prev_product = Some(production.product.clone());
                    prev_end = Some(production.end);
                }
            }
        }
    }
    Ok(())
}

fn verify_demand_satisfied(
    ot_requirements: &BTreeMap<String, BTreeMap<String, u64>>,
    ot_produced: &BTreeMap<String, BTreeMap<String, u64>>,
) -> Result<()> {
    for (ot_id, requirements) in ot_requirements {
        let produced_for_ot = ot_produced.get(ot_id);
        for (product, required) in requirements {
            let produced = produced_for_ot
                .and_then(|m| m.get(product))
                .copied()
                .unwrap_or(0);
            if produced < *required {
                return Err(ScheduleError::internal(
                    "demand_satisfied",
                    format!(
                        "OT `{ot_id}` required {required} units of `{product}` but only {produced} were scheduled"
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductionBlock, SetupBlock};

    fn production(machine: &str, start: f64, end: f64, product: &str, ot_ids: &[&str]) -> Block {
        Block::Production(ProductionBlock {
            machine: machine.to_string(),
            start,
            end,
            product: product.to_string(),
            quantity: 100,
            ot_ids: ot_ids.iter().map(|s| s.to_string()).collect(),
            on_time: true,
            id: None,
            due: None,
            qty_cliente: None,
            qty_extra: None,
        })
    }

    #[test]
    fn detects_overlap() {
        let blocks = vec![
            production("L1", 0.0, 5.0, "A", &["OT1"]),
            production("L1", 2.0, 7.0, "A", &["OT1"]),
        ];
        assert!(verify_no_overlap(&blocks).is_err());
    }

    #[test]
    fn accepts_adjacent_blocks() {
        let blocks = vec![
            production("L1", 0.0, 5.0, "A", &["OT1"]),
            production("L1", 5.0, 10.0, "A", &["OT1"]),
        ];
        assert!(verify_no_overlap(&blocks).is_ok());
    }

    #[test]
    fn requires_setup_between_different_products() {
        let blocks = vec![
            production("L1", 0.0, 5.0, "A", &["OT1"]),
            production("L1", 5.0, 10.0, "B", &["OT2"]),
        ];
        let initial = BTreeMap::new();
        assert!(verify_setup_correctness(&blocks, &initial).is_err());
    }

    #[test]
    fn accepts_setup_block_between_products() {
        let blocks = vec![
            production("L1", 0.0, 5.0, "A", &["OT1"]),
            Block::Setup(SetupBlock {
                machine: "L1".to_string(),
                start: 5.0,
                end: 6.5,
                format: "B".to_string(),
            }),
            production("L1", 6.5, 11.5, "B", &["OT2"]),
        ];
        let initial = BTreeMap::new();
        assert!(verify_setup_correctness(&blocks, &initial).is_ok());
    }
}
