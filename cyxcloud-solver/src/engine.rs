//! Optimization engine seam
//!
//! Planners talk to engines only through [`OptimizationEngine`]: hand over a
//! validated [`CpModel`], block until a terminal status comes back.

use std::fmt;
use std::time::Duration;

use crate::error::EngineError;
use crate::model::{BoolVar, CpModel, IntVar, LinearExpr};

/// Terminal status of a solve call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal (or, without an objective, a solution was found)
    Optimal,
    /// A solution was found but optimality was not proven
    Feasible,
    /// Proven to have no solution
    Infeasible,
    /// Gave up (limit reached) without finding a solution
    Unknown,
    /// The engine refused the model
    ModelInvalid,
}

impl SolveStatus {
    /// Whether the response carries a usable solution
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
            SolveStatus::ModelInvalid => "MODEL_INVALID",
        };
        f.write_str(s)
    }
}

/// Full assignment returned with a successful solve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<i64>,
}

impl Solution {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn value(&self, var: IntVar) -> i64 {
        self.values[var.index()]
    }

    pub fn bool_value(&self, lit: BoolVar) -> bool {
        lit.holds(self.values[lit.index()])
    }

    pub fn value_of(&self, expr: &LinearExpr) -> i64 {
        expr.evaluate(&self.values)
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

/// Engine response
#[derive(Debug, Clone)]
pub struct SolveResponse {
    pub status: SolveStatus,
    /// Objective value of the returned solution (0 without objective or solution)
    pub objective_value: i64,
    pub wall_time: Duration,
    /// Present exactly when `status.is_success()`
    pub solution: Option<Solution>,
}

/// A constraint-satisfaction / optimization engine
pub trait OptimizationEngine {
    /// Solve `model`, blocking until a terminal status is reached
    fn solve(&self, model: &CpModel) -> Result<SolveResponse, EngineError>;
}

impl<E: OptimizationEngine + ?Sized> OptimizationEngine for &E {
    fn solve(&self, model: &CpModel) -> Result<SolveResponse, EngineError> {
        (**self).solve(model)
    }
}

impl<E: OptimizationEngine + ?Sized> OptimizationEngine for Box<E> {
    fn solve(&self, model: &CpModel) -> Result<SolveResponse, EngineError> {
        (**self).solve(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success() {
        assert!(SolveStatus::Optimal.is_success());
        assert!(SolveStatus::Feasible.is_success());
        assert!(!SolveStatus::Infeasible.is_success());
        assert!(!SolveStatus::Unknown.is_success());
        assert!(!SolveStatus::ModelInvalid.is_success());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolveStatus::Infeasible.to_string(), "INFEASIBLE");
        assert_eq!(SolveStatus::Optimal.to_string(), "OPTIMAL");
    }
}
