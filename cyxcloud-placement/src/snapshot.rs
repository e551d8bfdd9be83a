//! Cluster state sources
//!
//! Where the planner's node list comes from. [`JsonSnapshot`] reads a
//! snapshot file, [`DemoCluster`] is a fixed nine-node, three-region layout
//! used when no snapshot is given.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::Node;

/// Snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Supplies the node list as of planning time
pub trait ClusterStateSource {
    fn nodes(&self) -> Result<Vec<Node>, SnapshotError>;
}

/// On-disk snapshot format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: Vec<Node>,
}

/// JSON snapshot file: `{"nodes": [{"id", "region", "has_range", "replica_count"}]}`
#[derive(Debug, Clone)]
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ClusterStateSource for JsonSnapshot {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn nodes(&self) -> Result<Vec<Node>, SnapshotError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;
        let snapshot: ClusterSnapshot = serde_json::from_str(&raw)?;
        debug!(nodes = snapshot.nodes.len(), "Loaded cluster snapshot");
        Ok(snapshot.nodes)
    }
}

/// Built-in demo layout
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoCluster;

impl ClusterStateSource for DemoCluster {
    fn nodes(&self) -> Result<Vec<Node>, SnapshotError> {
        let layout = [
            ("us-west-1a", true, 6),
            ("us-west-1a", false, 2),
            ("us-west-1a", true, 2),
            ("us-west-1b", true, 6),
            ("us-west-1b", false, 6),
            ("us-west-1b", false, 3),
            ("us-west-1c", false, 3),
            ("us-west-1c", false, 3),
            ("us-west-1c", false, 3),
        ];
        Ok(layout
            .iter()
            .enumerate()
            .map(|(i, &(region, has_range, count))| {
                Node::new(format!("node{}", i + 1), region, has_range, count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_json_snapshot_roundtrip_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": [
                {{"id": "a1", "region": "a", "has_range": true, "replica_count": 5}},
                {{"id": "b1", "region": "b", "has_range": false, "replica_count": 1}}
            ]}}"#
        )
        .unwrap();

        let nodes = JsonSnapshot::new(file.path()).nodes().unwrap();
        assert_eq!(
            nodes,
            vec![Node::new("a1", "a", true, 5), Node::new("b1", "b", false, 1)]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = JsonSnapshot::new("/nonexistent/cluster.json")
            .nodes()
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }

    #[test]
    fn test_malformed_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"nodes": [{{"id": "a1"}}]}}"#).unwrap();
        let err = JsonSnapshot::new(file.path()).nodes().unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));
    }

    #[test]
    fn test_demo_cluster_layout() {
        let nodes = DemoCluster.nodes().unwrap();
        assert_eq!(nodes.len(), 9);
        assert_eq!(nodes.iter().filter(|n| n.has_range).count(), 3);
        assert_eq!(nodes[0].id, "node1");
        assert_eq!(nodes[8].region, "us-west-1c");
    }
}
