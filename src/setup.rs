//! Setup-cost oracle: the time needed to switch a machine from
//! whatever it last produced to a new product.

use std::collections::BTreeMap;

/// Returns the setup time to move a machine from `prev` to `new`.
///
/// - No setup is needed if nothing was mounted yet, or the product is
///   unchanged.
/// - Otherwise looks up the `"{prev}-{new}"` key in `setup_times`, falling
///   back to `default_setup_time` when absent.
pub fn setup_time(
    prev: Option<&str>,
    new: &str,
    setup_times: &BTreeMap<String, f64>,
    default_setup_time: f64,
) -> f64 {
    match prev {
        None => 0.0,
        Some(prev) if prev == new => 0.0,
        Some(prev) => {
            let key = format!("{prev}-{new}");
            setup_times.get(&key).copied().unwrap_or(default_setup_time)
        }
    }
}
