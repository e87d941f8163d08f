//! Typed error model for the scheduler core.
//!
//! Realizes the three error classes of the design: malformed input is
//! rejected with `InvalidInput` before any dispatch work begins; soft
//! infeasibility (an OT running late) is never an error, it surfaces only
//! through `summary.atrasos` and block `on_time` flags; a violated schedule
//! invariant is `Internal` and indicates a bug in this crate, not bad input.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("invalid input in field `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("internal inconsistency in invariant `{invariant}`: {detail}")]
    Internal { invariant: String, detail: String },
}

impl ScheduleError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Internal {
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
