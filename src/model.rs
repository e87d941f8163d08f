//! Data model: input documents, canonicalized work orders, machine state,
//! and the schedule/summary output contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::error::{Result, ScheduleError};

/// One work order as it arrives on the wire. Accepts either dialect: a
/// `products` map, or the legacy `format` + `qty` pair. Both may be present
/// on different orders within the same batch; `canonicalize` normalizes
/// each order independently.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkOrderInput {
    pub id: String,
    pub due: f64,
    pub cluster: u32,
    #[serde(default)]
    pub products: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub qty: Option<u64>,
}

impl WorkOrderInput {
    /// An order is legacy-dialect iff it carries `format`/`qty` and no
    /// `products` map. A batch is dispatched via the legacy policy only if
    /// every order in it is legacy.
    pub fn is_legacy(&self) -> bool {
        self.products.is_none() && self.format.is_some()
    }

    fn canonicalize(&self, index: usize) -> Result<WorkOrder> {
        if self.due < 0.0 {
            return Err(ScheduleError::invalid(
                format!("orders[{index}].due"),
                "must be non-negative",
            ));
        }
        if self.cluster == 0 {
            return Err(ScheduleError::invalid(
                format!("orders[{index}].cluster"),
                "must be a positive integer",
            ));
        }

        let products = match (&self.products, &self.format, self.qty) {
            (Some(products), _, _) => {
                if products.is_empty() {
                    return Err(ScheduleError::invalid(
                        format!("orders[{index}].products"),
                        "must be non-empty",
                    ));
                }
                products.clone()
            }
            (None, Some(format), Some(qty)) => {
                let mut map = BTreeMap::new();
                map.insert(format.clone(), qty);
                map
            }
            _ => {
                return Err(ScheduleError::invalid(
                    format!("orders[{index}]"),
                    "must provide either `products` or both `format` and `qty`",
                ));
            }
        };

        for (product, qty) in &products {
            if *qty == 0 {
                return Err(ScheduleError::invalid(
                    format!("orders[{index}].products[{product}]"),
                    "quantity must be a positive integer",
                ));
            }
        }

        Ok(WorkOrder {
            id: self.id.clone(),
            due: self.due,
            cluster: self.cluster,
            products,
            is_legacy: self.is_legacy(),
        })
    }
}

/// A canonicalized work order: always a `products` map internally,
/// regardless of which wire dialect it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrder {
    pub id: String,
    pub due: f64,
    pub cluster: u32,
    pub products: BTreeMap<String, u64>,
    pub is_legacy: bool,
}

impl WorkOrder {
    /// The legacy dialect's single format/qty pair. Only meaningful when
    /// `is_legacy` is true (one entry in `products`).
    pub fn legacy_format_qty(&self) -> (&str, u64) {
        let (format, qty) = self
            .products
            .iter()
            .next()
            .expect("canonicalized order always has at least one product");
        (format.as_str(), *qty)
    }
}

/// A machine as it arrives on the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineInput {
    pub capacity: f64,
    #[serde(default)]
    pub available_at: f64,
    #[serde(default)]
    pub last_format: Option<String>,
}

/// Mutable machine state threaded through the dispatcher. One instance per
/// machine, mutated in place as blocks are emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub name: String,
    pub capacity: f64,
    pub available_at: f64,
    pub last_format: Option<String>,
}

/// The full input document consumed by [`crate::schedule`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleInput {
    pub orders: Vec<WorkOrderInput>,
    pub machines: BTreeMap<String, MachineInput>,
    #[serde(default)]
    pub setup_times: BTreeMap<String, f64>,
    #[serde(default)]
    pub config: ScheduleConfig,
}

/// Validates the defensive preconditions the core is willing to assume are
/// already true. Returns the first violation found; field names follow the
/// input document's own shape so a caller can locate them.
pub fn validate_input(input: &ScheduleInput) -> Result<()> {
    if input.orders.is_empty() {
        return Err(ScheduleError::invalid("orders", "must be non-empty"));
    }
    if input.machines.is_empty() {
        return Err(ScheduleError::invalid("machines", "must be non-empty"));
    }

    let mut seen_ids = std::collections::BTreeSet::new();
    for order in &input.orders {
        if !seen_ids.insert(order.id.clone()) {
            return Err(ScheduleError::invalid(
                "orders[*].id",
                format!("duplicate order id `{}`", order.id),
            ));
        }
    }

    for (name, machine) in &input.machines {
        if !(machine.capacity > 0.0) {
            return Err(ScheduleError::invalid(
                format!("machines[{name}].capacity"),
                "must be positive",
            ));
        }
        if machine.available_at < 0.0 {
            return Err(ScheduleError::invalid(
                format!("machines[{name}].available_at"),
                "must be non-negative",
            ));
        }
    }

    for key in input.setup_times.values() {
        if *key < 0.0 {
            return Err(ScheduleError::invalid(
                "setup_times[*]",
                "setup durations must be non-negative",
            ));
        }
    }

    Ok(())
}

/// Canonicalizes every order in the batch, failing on the first invalid one.
pub fn canonicalize_orders(orders: &[WorkOrderInput]) -> Result<Vec<WorkOrder>> {
    orders
        .iter()
        .enumerate()
        .map(|(index, order)| order.canonicalize(index))
        .collect()
}

/// True iff every order in the batch is legacy-dialect; the legacy
/// aprovechamiento policy is selected only in that case.
pub fn is_legacy_batch(orders: &[WorkOrderInput]) -> bool {
    orders.iter().all(WorkOrderInput::is_legacy)
}

pub fn build_machine_states(
    machines: &BTreeMap<String, MachineInput>,
) -> BTreeMap<String, MachineState> {
    machines
        .iter()
        .map(|(name, machine)| {
            (
                name.clone(),
                MachineState {
                    name: name.clone(),
                    capacity: machine.capacity,
                    available_at: machine.available_at,
                    last_format: machine.last_format.clone(),
                },
            )
        })
        .collect()
}

/// One emitted schedule block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Block {
    #[serde(rename = "SETUP")]
    Setup(SetupBlock),
    #[serde(rename = "PRODUCTION")]
    Production(ProductionBlock),
}

impl Block {
    pub fn machine(&self) -> &str {
        match self {
            Block::Setup(b) => &b.machine,
            Block::Production(b) => &b.machine,
        }
    }

    pub fn start(&self) -> f64 {
        match self {
            Block::Setup(b) => b.start,
            Block::Production(b) => b.start,
        }
    }

    pub fn end(&self) -> f64 {
        match self {
            Block::Setup(b) => b.end,
            Block::Production(b) => b.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetupBlock {
    pub machine: String,
    pub start: f64,
    pub end: f64,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionBlock {
    pub machine: String,
    pub start: f64,
    pub end: f64,
    pub product: String,
    pub quantity: u64,
    pub ot_ids: Vec<String>,
    pub on_time: bool,
    /// Legacy-dialect fields. Absent (and omitted from JSON) on the
    /// multi-product path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty_cliente: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty_extra: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atraso {
    pub ot_id: String,
    pub atraso_horas: f64,
    pub cluster: u32,
    pub due: f64,
    pub completion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_ots: usize,
    pub total_setups: usize,
    pub total_horas: f64,
    pub qty_total_cliente: u64,
    pub qty_total_extra: u64,
    pub atrasos: Vec<Atraso>,
    pub horizonte_usado: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutput {
    pub schedule: Vec<Block>,
    pub schedule_by_machine: BTreeMap<String, Vec<Block>>,
    pub summary: Summary,
}
