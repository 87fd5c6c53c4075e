//! Failure taxonomy of a clustering run.
//!
//! An empty scope and a non-computable quality score are not errors; they
//! are carried by `RunOutcome::Empty` and `Quality::NotApplicable`.

use thiserror::Error;

/// A user-actionable problem with the requested parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterViolation {
    #[error("k = {k} exceeds the number of rows ({rows})")]
    KExceedsRows { k: usize, rows: usize },

    #[error("k must be at least 1, got {k}")]
    InvalidK { k: usize },

    #[error("epsilon must be a finite positive number, got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },

    #[error("min_points must be at least 2, got {min_points}")]
    InvalidMinPoints { min_points: usize },

    #[error("no clusters formed, all {rows} points are noise")]
    AllNoise { rows: usize },
}

impl ParameterViolation {
    /// What the caller can change to get a result.
    pub fn hint(&self) -> &'static str {
        match self {
            ParameterViolation::KExceedsRows { .. } => {
                "choose a smaller k or a scope with more sub-districts"
            }
            ParameterViolation::InvalidK { .. } => {
                "choose a k of at least 1 and no more than the number of rows"
            }
            ParameterViolation::InvalidEpsilon { .. } => "choose an epsilon greater than 0",
            ParameterViolation::InvalidMinPoints { .. } => "choose a min_points of 2 or more",
            ParameterViolation::AllNoise { .. } => "increase epsilon or decrease min_points",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store could not be reached, timed out or returned unreadable data.
    #[error("store unavailable: {0:#}")]
    Store(anyhow::Error),

    #[error("{0} (hint: {hint})", hint = .0.hint())]
    Parameter(#[from] ParameterViolation),

    #[error("clustering computation failed: {0}")]
    Computation(String),
}
