//! Placement model
//!
//! Nodes as seen at planning time and the regions derived from them.
//! Regions are discovered from the node list, so a node in a region nobody
//! listed up front is never silently ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, Result};

/// A storage node, as of planning time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Label used when reporting operations
    pub id: String,
    /// Failure domain
    pub region: String,
    /// Whether the node holds a replica of the range being planned
    pub has_range: bool,
    /// Replicas (of any range) already on the node; the load proxy
    pub replica_count: u32,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        region: impl Into<String>,
        has_range: bool,
        replica_count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            has_range,
            replica_count,
        }
    }
}

/// One failure domain and the indices of its member nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub members: Vec<usize>,
}

/// Immutable input of one planning run
#[derive(Debug, Clone)]
pub struct PlacementModel {
    nodes: Vec<Node>,
    regions: Vec<Region>,
}

impl PlacementModel {
    /// Build the model, deriving regions (sorted by name) from `nodes`
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(PlacementError::InvalidInput(
                "no nodes to plan over".to_string(),
            ));
        }

        let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            members.entry(node.region.as_str()).or_default().push(i);
        }
        let regions = members
            .into_iter()
            .map(|(name, members)| Region {
                name: name.to_string(),
                members,
            })
            .collect();

        Ok(Self { nodes, regions })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Upper bound for any node's load after planning
    pub fn max_replica_count(&self) -> i64 {
        self.nodes
            .iter()
            .map(|n| i64::from(n.replica_count))
            .max()
            .unwrap_or(0)
    }

    /// Regions holding at least one replica of the range today
    pub fn current_diversity(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.members.iter().any(|&i| self.nodes[i].has_range))
            .count()
    }

    /// Replicas of the range today
    pub fn replica_total(&self) -> usize {
        self.nodes.iter().filter(|n| n.has_range).count()
    }

    /// Current max - min load over all nodes
    pub fn current_spread(&self) -> i64 {
        let min = self
            .nodes
            .iter()
            .map(|n| i64::from(n.replica_count))
            .min()
            .unwrap_or(0);
        self.max_replica_count() - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_nodes() -> Vec<Node> {
        vec![
            Node::new("n1", "us-west-1b", true, 4),
            Node::new("n2", "us-west-1a", false, 2),
            Node::new("n3", "us-west-1b", false, 7),
            Node::new("n4", "us-west-1c", true, 1),
        ]
    }

    #[test]
    fn test_rejects_empty_input() {
        let err = PlacementModel::new(Vec::new()).unwrap_err();
        assert!(matches!(err, PlacementError::InvalidInput(_)));
    }

    #[test]
    fn test_regions_derived_from_nodes() {
        let model = PlacementModel::new(sample_nodes()).unwrap();
        let names: Vec<_> = model.regions().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["us-west-1a", "us-west-1b", "us-west-1c"]);
        assert_eq!(model.regions()[1].members, vec![0, 2]);
    }

    #[test]
    fn test_derived_quantities() {
        let model = PlacementModel::new(sample_nodes()).unwrap();
        assert_eq!(model.max_replica_count(), 7);
        assert_eq!(model.current_diversity(), 2);
        assert_eq!(model.replica_total(), 2);
        assert_eq!(model.current_spread(), 6);
    }

    #[test]
    fn test_node_deserialize() {
        let node: Node = serde_json::from_str(
            r#"{"id":"n9","region":"eu-1","has_range":true,"replica_count":3}"#,
        )
        .unwrap();
        assert_eq!(node, Node::new("n9", "eu-1", true, 3));
    }
}
