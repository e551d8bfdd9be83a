//! Error types for placement planning
//!
//! Every error is terminal for the planning run that raised it. Solver
//! failures carry the phase they happened in, so a caller can tell "no
//! better layout exists" apart from "only the balance refinement failed".

use cyxcloud_solver::ModelError;
use thiserror::Error;

use crate::orchestrator::{Phase, PlanState};

/// Result type alias for placement planning
pub type Result<T> = std::result::Result<T, PlacementError>;

/// Placement planning errors
#[derive(Error, Debug)]
pub enum PlacementError {
    #[error("Invalid placement input: {0}")]
    InvalidInput(String),

    #[error("{phase} model rejected: {source}")]
    ModelBuild {
        phase: Phase,
        #[source]
        source: ModelError,
    },

    #[error("{phase} solve failed: {reason}")]
    Solve { phase: Phase, reason: String },

    #[error("{phase} infeasible")]
    Infeasible { phase: Phase },

    #[error("Cannot {step} while {state:?}")]
    InvalidTransition { step: &'static str, state: PlanState },
}

impl PlacementError {
    /// Phase a solver-side failure belongs to
    pub fn phase(&self) -> Option<Phase> {
        match self {
            PlacementError::ModelBuild { phase, .. }
            | PlacementError::Solve { phase, .. }
            | PlacementError::Infeasible { phase } => Some(*phase),
            PlacementError::InvalidInput(_) | PlacementError::InvalidTransition { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_phase_tagged() {
        let err = PlacementError::Infeasible {
            phase: Phase::Diversity,
        };
        assert_eq!(err.to_string(), "phase-1 infeasible");

        let err = PlacementError::Solve {
            phase: Phase::Balance,
            reason: "engine returned status UNKNOWN".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "phase-2 solve failed: engine returned status UNKNOWN"
        );
        assert_eq!(err.phase(), Some(Phase::Balance));
    }

    #[test]
    fn test_input_errors_have_no_phase() {
        let err = PlacementError::InvalidInput("no nodes to plan over".to_string());
        assert_eq!(err.phase(), None);
    }
}
