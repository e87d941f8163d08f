//! Tunables and fixed constants of the scheduling design.

use serde::{Deserialize, Serialize};

/// Urgent/normal split point for the two-phase dispatcher. Fixed design
/// constant, not user-configurable.
pub const URGENT_THRESHOLD_HOURS: f64 = 40.0;

/// Floating-point tolerance used wherever block boundaries or completion
/// times are compared (`<=`, `==`) to absorb rounding from repeated
/// division/multiplication of quantities by capacities.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Forward window (hours) within which future same-format demand is
    /// eligible for anticipated production. Legacy path only.
    pub horizonte_aprovechamiento: f64,
    /// Per-unit, per-hour inventory holding cost used by the legacy
    /// aprovechamiento economic test. Legacy path only.
    pub costo_inventario_unitario: f64,
    /// Setup duration used when `setup_times` has no entry for a pair.
    pub default_setup_time: f64,
    /// Average setup hours the aprovechamiento heuristic assumes it saves
    /// by producing ahead of demand. Defaults to 1.5 to match the original
    /// policy's behavior when no override is supplied.
    pub aprovechamiento_setup_hours_saved: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            horizonte_aprovechamiento: 12.0,
            costo_inventario_unitario: 0.002,
            default_setup_time: 1.5,
            aprovechamiento_setup_hours_saved: 1.5,
        }
    }
}
