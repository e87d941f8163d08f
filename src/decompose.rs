//! Task decomposer: normalizes a batch of canonicalized work orders
//! into one product task per (OT, product) pair, plus the auxiliary lookups
//! the dispatcher needs to track demand and completion per OT.

use std::collections::BTreeMap;

use crate::model::WorkOrder;

/// One (OT, product) demand entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductTask {
    pub product: String,
    pub quantity: u64,
    pub ot_id: String,
    pub ot_due: f64,
    pub ot_cluster: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    pub tasks: Vec<ProductTask>,
    /// ot_id -> product -> required quantity.
    pub ot_requirements: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Decomposes a batch of canonicalized orders into product tasks. Iteration
/// order of each order's `products` map does not matter here: callers
/// re-sort by product and due date as the design requires.
pub fn decompose(orders: &[WorkOrder]) -> Decomposition {
    let mut tasks = Vec::new();
    let mut ot_requirements: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();

    for order in orders {
        for (product, quantity) in &order.products {
            tasks.push(ProductTask {
                product: product.clone(),
                quantity: *quantity,
                ot_id: order.id.clone(),
                ot_due: order.due,
                ot_cluster: order.cluster,
            });
            ot_requirements
                .entry(order.id.clone())
                .or_default()
                .insert(product.clone(), *quantity);
        }
    }

    Decomposition {
        tasks,
        ot_requirements,
    }
}
