//! CyxCloud Solver Library
//!
//! Constraint-model plumbing shared by CyxCloud planners.
//! This crate provides:
//! - A CP model builder (bounded integer/boolean variables, linear
//!   constraints with enforcement literals, max/min aggregation,
//!   objectives and warm-start hints)
//! - The [`OptimizationEngine`] trait planners solve models through
//! - [`BranchAndBound`], a built-in exhaustive engine for small models

pub mod engine;
pub mod error;
pub mod model;
pub mod search;

pub use engine::{OptimizationEngine, Solution, SolveResponse, SolveStatus};
pub use error::{EngineError, ModelError, Result};
pub use model::{
    BoolVar, Constraint, CpModel, CpModelBuilder, Domain, Hint, IntVar, LinearExpr, Objective,
    Sense, VarDecl,
};
pub use search::{BranchAndBound, SearchLimits};
