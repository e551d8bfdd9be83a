//! CyxCloud Placement Library
//!
//! Plans how to move replicas of a range across storage nodes grouped into
//! regions. Each planning run proposes at most one removal and one addition:
//! - Phase 1 maximizes the number of regions holding a replica
//! - Phase 2 keeps that diversity and minimizes the load spread between the
//!   most and least loaded node
//!
//! Both phases are solved through a [`cyxcloud_solver::OptimizationEngine`].

pub mod builder;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod snapshot;

// Re-export main types
pub use builder::{BalanceVars, NodeVars, PlacementVars, MAX_MOVES};
pub use config::{ConfigError, LogFormat, PlannerConfig};
pub use error::{PlacementError, Result};
pub use model::{Node, PlacementModel, Region};
pub use orchestrator::{Phase, PlanRun, PlanState, Planner};
pub use report::{NodeOutcome, PhaseStats, PlacementReport, RegionOutcome, ReplicaOp};
pub use snapshot::{ClusterSnapshot, ClusterStateSource, DemoCluster, JsonSnapshot, SnapshotError};
