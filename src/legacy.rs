//! Legacy aprovechamiento policy: a single-pass greedy dispatcher used only
//! when every input OT is in the legacy single-product form. It preserves
//! the "produce extra now to save a future setup" behavior of the original
//! design; it never splits a single OT across machines.

use std::collections::BTreeMap;

use crate::config::{ScheduleConfig, EPSILON};
use crate::model::{Block, MachineState, ProductionBlock, SetupBlock, WorkOrder};
use crate::setup::setup_time;

pub struct LegacyResult {
    pub blocks: Vec<Block>,
    pub ot_due: BTreeMap<String, f64>,
    pub ot_cluster: BTreeMap<String, u32>,
    pub ot_completion: BTreeMap<String, f64>,
    pub ot_produced: BTreeMap<String, BTreeMap<String, u64>>,
    pub ot_requirements: BTreeMap<String, BTreeMap<String, u64>>,
    pub qty_total_extra: u64,
    pub horizonte_usado: f64,
}

struct LegacyOrder {
    id: String,
    due: f64,
    cluster: u32,
    format: String,
    qty: u64,
}

pub fn run(
    orders: &[WorkOrder],
    machines: &mut BTreeMap<String, MachineState>,
    setup_times: &BTreeMap<String, f64>,
    config: &ScheduleConfig,
) -> LegacyResult {
    let legacy_orders: Vec<LegacyOrder> = orders
        .iter()
        .map(|order| {
            let (format, qty) = order.legacy_format_qty();
            LegacyOrder {
                id: order.id.clone(),
                due: order.due,
                cluster: order.cluster,
                format: format.to_string(),
                qty,
            }
        })
        .collect();

    let mut dispatch_order: Vec<usize> = (0..legacy_orders.len()).collect();
    dispatch_order.sort_by(|&a, &b| {
        let prioridad_a = legacy_orders[a].due / f64::from(legacy_orders[a].cluster);
        let prioridad_b = legacy_orders[b].due / f64::from(legacy_orders[b].cluster);
        prioridad_a
            .partial_cmp(&prioridad_b)
            .unwrap()
            .then_with(|| legacy_orders[a].id.cmp(&legacy_orders[b].id))
    });

    let mut blocks = Vec::new();
    let mut ot_due = BTreeMap::new();
    let mut ot_cluster = BTreeMap::new();
    let mut ot_completion = BTreeMap::new();
    let mut ot_produced: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut ot_requirements = BTreeMap::new();
    let mut qty_total_extra: u64 = 0;
    let mut horizonte_usado: f64 = 0.0;

    for order in &legacy_orders {
        ot_due.insert(order.id.clone(), order.due);
        ot_cluster.insert(order.id.clone(), order.cluster);
        let mut requirement = BTreeMap::new();
        requirement.insert(order.format.clone(), order.qty);
        ot_requirements.insert(order.id.clone(), requirement);
    }

    for &i in &dispatch_order {
        let order = &legacy_orders[i];

        let futures: Vec<&LegacyOrder> = legacy_orders
            .iter()
            .filter(|k| {
                k.format == order.format
                    && order.due < k.due
                    && k.due <= order.due + config.horizonte_aprovechamiento
            })
            .collect();

        let qty_extra = if futures.is_empty() {
            0
        } else {
            let qty_future: u64 = futures.iter().map(|k| k.qty).sum();
            let inventory_cost = qty_future as f64
                * config.costo_inventario_unitario
                * config.horizonte_aprovechamiento;
            if config.aprovechamiento_setup_hours_saved > inventory_cost {
                (0.5 * qty_future as f64).floor() as u64
            } else {
                0
            }
        };
        if qty_extra > 0 {
            qty_total_extra += qty_extra;
            horizonte_usado = horizonte_usado.max(config.horizonte_aprovechamiento);
            log::debug!(
                "legacy: OT `{}` anticipates {qty_extra} extra units of `{}`",
                order.id,
                order.format
            );
        }
        let produced_qty = order.qty + qty_extra;

        let mut best: Option<(String, f64, f64, f64)> = None; // name, setup, start, finish
        for machine in machines.values() {
            let setup = setup_time(
                machine.last_format.as_deref(),
                &order.format,
                setup_times,
                config.default_setup_time,
            );
            let start = machine.available_at + setup;
            let finish = start + produced_qty as f64 / machine.capacity;
            let improves = match &best {
                None => true,
                Some((_, _, _, best_finish)) => finish < *best_finish - EPSILON,
            };
            if improves {
                best = Some((machine.name.clone(), setup, start, finish));
            }
        }
        let (machine_name, setup, start, end) =
            best.expect("distribute is never called with an empty machine set");

        if setup > EPSILON {
            blocks.push(Block::Setup(SetupBlock {
                machine: machine_name.clone(),
                start: start - setup,
                end: start,
                format: order.format.clone(),
            }));
        }

        let on_time = end <= order.due + EPSILON;
        if !on_time {
            log::warn!("legacy: OT `{}` completes after its due date", order.id);
        }
        blocks.push(Block::Production(ProductionBlock {
            machine: machine_name.clone(),
            start,
            end,
            product: order.format.clone(),
            quantity: produced_qty,
            ot_ids: vec![order.id.clone()],
            on_time,
            id: Some(order.id.clone()),
            due: Some(order.due),
            qty_cliente: Some(order.qty),
            qty_extra: Some(qty_extra),
        }));

        ot_completion.insert(order.id.clone(), end);
        ot_produced
            .entry(order.id.clone())
            .or_default()
            .insert(order.format.clone(), produced_qty);

        let machine = machines
            .get_mut(&machine_name)
            .expect("best assignment references a known machine");
        machine.available_at = end;
        machine.last_format = Some(order.format.clone());
    }

    LegacyResult {
        blocks,
        ot_due,
        ot_cluster,
        ot_completion,
        ot_produced,
        ot_requirements,
        qty_total_extra,
        horizonte_usado,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(name: &str, capacity: f64) -> (String, MachineState) {
        (
            name.to_string(),
            MachineState {
                name: name.to_string(),
                capacity,
                available_at: 0.0,
                last_format: None,
            },
        )
    }

    fn legacy_order(id: &str, due: f64, cluster: u32, format: &str, qty: u64) -> WorkOrder {
        WorkOrder {
            id: id.to_string(),
            due,
            cluster,
            products: [(format.to_string(), qty)].into(),
            is_legacy: true,
        }
    }

    #[test]
    fn two_ots_different_formats_same_machine() {
        let orders = vec![
            legacy_order("OT1", 12.0, 5, "A", 800),
            legacy_order("OT2", 18.0, 4, "B", 500),
        ];
        let mut setup_times = BTreeMap::new();
        setup_times.insert("A-B".to_string(), 1.5);
        let mut machines: BTreeMap<String, MachineState> = [machine("L1", 120.0)].into();
        let config = ScheduleConfig::default();
        let result = run(&orders, &mut machines, &setup_times, &config);

        let productions: Vec<&ProductionBlock> = result
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Production(p) => Some(p),
                Block::Setup(_) => None,
            })
            .collect();
        assert_eq!(productions[0].id.as_deref(), Some("OT1"));
        assert_eq!(productions[1].id.as_deref(), Some("OT2"));
        assert!(productions.iter().all(|p| p.on_time));
        assert!((productions[1].end - (800.0 / 120.0 + 1.5 + 500.0 / 120.0)).abs() < 1e-6);
    }

    #[test]
    fn qty_extra_is_zero_without_future_demand() {
        let orders = vec![legacy_order("X", 10.0, 1, "A", 100)];
        let mut machines: BTreeMap<String, MachineState> = [machine("L1", 100.0)].into();
        let config = ScheduleConfig::default();
        let result = run(&orders, &mut machines, &BTreeMap::new(), &config);

        let production = result
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Production(p) => Some(p),
                Block::Setup(_) => None,
            })
            .unwrap();
        assert_eq!(production.qty_extra, Some(0));
    }

    #[test]
    fn qty_extra_skipped_when_uneconomical() {
        let mut orders = vec![legacy_order("X", 10.0, 1, "A", 100)];
        for (i, qty) in [300u64, 300, 300].into_iter().enumerate() {
            orders.push(legacy_order(&format!("F{i}"), 15.0, 1, "A", qty));
        }
        let mut machines: BTreeMap<String, MachineState> = [machine("L1", 100.0)].into();
        let config = ScheduleConfig::default(); // costo_inventario_unitario = 0.002
        let result = run(&orders, &mut machines, &BTreeMap::new(), &config);
        let production = result
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Production(p) if p.id.as_deref() == Some("X") => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(production.qty_extra, Some(0));
    }

    #[test]
    fn qty_extra_applied_when_economical() {
        let mut orders = vec![legacy_order("X", 10.0, 1, "A", 100)];
        for (i, qty) in [300u64, 300, 300].into_iter().enumerate() {
            orders.push(legacy_order(&format!("F{i}"), 15.0, 1, "A", qty));
        }
        let mut machines: BTreeMap<String, MachineState> = [machine("L1", 100.0)].into();
        let mut config = ScheduleConfig::default();
        config.costo_inventario_unitario = 0.0001;
        let result = run(&orders, &mut machines, &BTreeMap::new(), &config);
        let production = result
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Production(p) if p.id.as_deref() == Some("X") => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(production.qty_extra, Some(450));
    }
}
