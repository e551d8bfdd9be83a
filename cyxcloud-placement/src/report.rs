//! Result reporter
//!
//! Pure read of a solved balance-phase model: per node the chosen operation
//! and resulting load, per region whether it still holds a replica. The
//! report is advisory; applying it to the cluster is somebody else's job.

use std::fmt;

use cyxcloud_solver::Solution;
use serde::Serialize;

use crate::builder::{self, BalanceVars, PlacementVars};
use crate::model::PlacementModel;
use crate::orchestrator::Phase;

/// Planned change to a node's holding of the range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaOp {
    Remove,
    Keep,
    Add,
}

impl ReplicaOp {
    pub fn from_value(value: i64) -> Self {
        match value.signum() {
            -1 => ReplicaOp::Remove,
            0 => ReplicaOp::Keep,
            _ => ReplicaOp::Add,
        }
    }

    /// The `op` value: -1, 0 or +1
    pub fn delta(self) -> i64 {
        match self {
            ReplicaOp::Remove => -1,
            ReplicaOp::Keep => 0,
            ReplicaOp::Add => 1,
        }
    }
}

/// Solve statistics of one phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseStats {
    pub phase: Phase,
    pub status: String,
    pub objective: i64,
    pub wall_time_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub index: usize,
    pub id: String,
    pub region: String,
    pub op: ReplicaOp,
    pub replica_count: u32,
    pub replica_count_after: i64,
    /// Whether the node holds the range once the plan is applied
    pub has_range_after: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionOutcome {
    pub name: String,
    pub occupied: bool,
}

/// Outcome of a planning run
#[derive(Debug, Clone, Serialize)]
pub struct PlacementReport {
    /// Occupied regions after the plan (the phase-1 optimum)
    pub diversity: i64,
    /// `max_replica_count - min_replica_count` after the plan
    pub spread: i64,
    pub max_replica_count: i64,
    pub min_replica_count: i64,
    pub nodes: Vec<NodeOutcome>,
    pub regions: Vec<RegionOutcome>,
    pub phases: Vec<PhaseStats>,
}

impl PlacementReport {
    pub(crate) fn collect(
        model: &PlacementModel,
        vars: &PlacementVars,
        balance: &BalanceVars,
        solution: &Solution,
        phases: Vec<PhaseStats>,
    ) -> Self {
        let nodes = model
            .nodes()
            .iter()
            .zip(&vars.nodes)
            .enumerate()
            .map(|(index, (node, node_vars))| {
                let op = ReplicaOp::from_value(solution.value(node_vars.op));
                NodeOutcome {
                    index,
                    id: node.id.clone(),
                    region: node.region.clone(),
                    op,
                    replica_count: node.replica_count,
                    replica_count_after: solution.value(node_vars.replica_count_after),
                    has_range_after: i64::from(node.has_range) + op.delta() > 0,
                }
            })
            .collect();

        let regions = model
            .regions()
            .iter()
            .zip(&vars.regions)
            .map(|(region, &occupied)| RegionOutcome {
                name: region.name.clone(),
                occupied: solution.bool_value(occupied),
            })
            .collect();

        Self {
            diversity: solution.value_of(vars.diversity()),
            spread: solution.value_of(balance.spread()),
            max_replica_count: solution.value(balance.max_replica_count),
            min_replica_count: solution.value(balance.min_replica_count),
            nodes,
            regions,
            phases,
        }
    }

    /// Nodes with something to do, in node order
    pub fn operations(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.nodes.iter().filter(|n| n.op != ReplicaOp::Keep)
    }

    /// Node losing a replica, if any
    pub fn removal(&self) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|n| n.op == ReplicaOp::Remove)
    }

    /// Node gaining a replica, if any
    pub fn addition(&self) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|n| n.op == ReplicaOp::Add)
    }

    pub fn is_noop(&self) -> bool {
        self.operations().next().is_none()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let describe = |node: Option<&NodeOutcome>| {
            node.map(|n| format!("{} ({})", n.id, n.region))
                .unwrap_or_else(|| "none".to_string())
        };
        format!(
            "diversity {}, spread {}, remove from {}, add to {}",
            self.diversity,
            self.spread,
            describe(self.removal()),
            describe(self.addition())
        )
    }
}

impl fmt::Display for PlacementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{}: {}", builder::op_name(node.index), node.op.delta())?;
            writeln!(
                f,
                "{}: {}",
                builder::replica_count_after_name(node.index),
                node.replica_count_after
            )?;
        }
        for region in &self.regions {
            writeln!(f, "{}: {}", builder::region_name(&region.name), region.occupied)?;
        }
        Ok(())
    }
}
