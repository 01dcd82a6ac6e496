//! Cluster topology model.
//!
//! A [`ClusterTopology`] is the static view of the cluster: every node with
//! its thread capacity, and the named partitions that group them. It is
//! loaded once from a YAML (or JSON) document and never mutated afterwards,
//! so it can be shared by reference across any number of tracking loops.
//!
//! ```yaml
//! nodes:
//!   - address: 10.0.0.1
//!     os_family: linux
//!     thread_count: 32
//!   - address: 10.0.0.2
//!     thread_count: 16
//! partitions:
//!   compute:
//!     nodes: [10.0.0.1, 10.0.0.2]
//!     max_walltime: "24:00:00"
//!   debug:
//!     nodes: [10.0.0.2]
//!     max_walltime: unbounded
//! ```
//!
//! **Invariants** (checked by [`ClusterTopology::from_yaml_str`]):
//! - node addresses are unique and every `thread_count` is positive;
//! - every node a partition references is declared under `nodes`, once;
//! - every partition holds at least one node.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::spec::TimeLimit;

/// Operating system family of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[default]
    Linux,
    Windows,
    Macos,
    Other,
}

/// One cluster machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Hostname or IP address, as the scheduler knows it.
    pub address: String,
    pub os_family: OsFamily,
    /// Hardware threads available to jobs. Always positive.
    pub thread_count: u32,
}

/// A named allocation domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub name: String,
    /// Member node addresses in declared order.
    pub node_addresses: Vec<String>,
    /// Longest time limit the partition accepts. `None` means unbounded.
    pub max_walltime: Option<TimeLimit>,
}

/// Immutable snapshot of the cluster.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    nodes: Vec<Node>,
    partitions: BTreeMap<String, Partition>,
    index: FxHashMap<String, usize>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopology {
    nodes: Vec<RawNode>,
    #[serde(default)]
    partitions: BTreeMap<String, RawPartition>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNode {
    address: String,
    #[serde(default)]
    os_family: OsFamily,
    #[serde(alias = "threads")]
    thread_count: Option<i64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPartition {
    nodes: Vec<String>,
    #[serde(default)]
    max_walltime: Option<String>,
}

impl ClusterTopology {
    /// Load a topology document from disk.
    pub fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!(
                "cannot read cluster configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a topology document.
    pub fn from_yaml_str(text: &str) -> OrchestratorResult<Self> {
        let raw: RawTopology = serde_yaml::from_str(text).map_err(|e| {
            OrchestratorError::Config(format!("unparsable cluster configuration: {e}"))
        })?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        let mut index = FxHashMap::default();

        for node in raw.nodes {
            let thread_count = match node.thread_count {
                None => {
                    return Err(OrchestratorError::Config(format!(
                        "node {} has no thread_count",
                        node.address
                    )));
                }
                Some(n) if n <= 0 => {
                    return Err(OrchestratorError::Config(format!(
                        "node {} has non-positive thread_count {n}",
                        node.address
                    )));
                }
                Some(n) => u32::try_from(n).map_err(|_| {
                    OrchestratorError::Config(format!(
                        "node {} thread_count {n} is out of range",
                        node.address
                    ))
                })?,
            };

            if index.insert(node.address.clone(), nodes.len()).is_some() {
                return Err(OrchestratorError::Config(format!(
                    "node {} is declared more than once",
                    node.address
                )));
            }

            nodes.push(Node {
                address: node.address,
                os_family: node.os_family,
                thread_count,
            });
        }

        let mut partitions = BTreeMap::new();
        for (name, partition) in raw.partitions {
            if partition.nodes.is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "partition {name} has no nodes"
                )));
            }
            if let Some(missing) = partition.nodes.iter().find(|a| !index.contains_key(*a)) {
                return Err(OrchestratorError::Config(format!(
                    "partition {name} references undeclared node {missing}"
                )));
            }
            let repeated = {
                let mut members = FxHashSet::default();
                let first = partition.nodes.iter().find(|a| !members.insert(a.as_str()));
                first.cloned()
            };
            if let Some(repeated) = repeated {
                return Err(OrchestratorError::Config(format!(
                    "partition {name} lists node {repeated} more than once"
                )));
            }

            let max_walltime = match partition.max_walltime.as_deref() {
                None => None,
                Some(s) if is_unbounded(s) => None,
                Some(s) => Some(s.parse::<TimeLimit>().map_err(|e| {
                    OrchestratorError::Config(format!(
                        "partition {name} has invalid max_walltime: {e}"
                    ))
                })?),
            };

            partitions.insert(
                name.clone(),
                Partition {
                    name,
                    node_addresses: partition.nodes,
                    max_walltime,
                },
            );
        }

        Ok(Self {
            nodes,
            partitions,
            index,
        })
    }

    /// All nodes in declared order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All partitions, sorted by name.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Look up a node by address.
    pub fn node(&self, address: &str) -> Option<&Node> {
        self.index.get(address).map(|&i| &self.nodes[i])
    }

    /// Look up a partition by name.
    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.get(name)
    }

    /// Member nodes of a partition, in the partition's declared order.
    pub fn partition_nodes(&self, name: &str) -> Option<Vec<&Node>> {
        self.partition(name).map(|p| {
            p.node_addresses
                .iter()
                .filter_map(|a| self.node(a))
                .collect()
        })
    }

    /// Sum of thread capacity across a partition.
    pub fn total_threads(&self, partition: &str) -> Option<u64> {
        self.partition_nodes(partition)
            .map(|nodes| nodes.iter().map(|n| u64::from(n.thread_count)).sum())
    }

    /// Nodes running the given OS family, in declared order.
    pub fn nodes_by_os(&self, os_family: OsFamily) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.os_family == os_family)
            .collect()
    }
}

fn is_unbounded(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "unbounded" | "unlimited" | "infinite"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER: &str = r#"
nodes:
  - address: n1
    thread_count: 32
  - address: n2
    os_family: windows
    thread_count: 16
  - address: n3
    threads: 8
partitions:
  compute:
    nodes: [n1, n2, n3]
    max_walltime: "24:00:00"
  small:
    nodes: [n3]
    max_walltime: unbounded
"#;

    #[test]
    fn test_load_cluster() {
        let topo = ClusterTopology::from_yaml_str(CLUSTER).unwrap();
        assert_eq!(topo.nodes().len(), 3);
        assert_eq!(topo.node("n3").unwrap().thread_count, 8);
        assert_eq!(topo.node("n2").unwrap().os_family, OsFamily::Windows);

        let compute = topo.partition("compute").unwrap();
        assert_eq!(compute.node_addresses, vec!["n1", "n2", "n3"]);
        assert_eq!(compute.max_walltime.unwrap().as_secs(), 24 * 3600);
        assert!(topo.partition("small").unwrap().max_walltime.is_none());
    }

    #[test]
    fn test_partition_queries() {
        let topo = ClusterTopology::from_yaml_str(CLUSTER).unwrap();
        assert_eq!(topo.total_threads("compute"), Some(56));
        assert_eq!(topo.total_threads("missing"), None);
        let addrs: Vec<_> = topo
            .partition_nodes("compute")
            .unwrap()
            .iter()
            .map(|n| n.address.as_str())
            .collect();
        assert_eq!(addrs, ["n1", "n2", "n3"]);
        assert_eq!(topo.nodes_by_os(OsFamily::Linux).len(), 2);
    }

    #[test]
    fn test_undeclared_node_rejected() {
        let doc = "nodes:\n  - {address: a, thread_count: 4}\npartitions:\n  p: {nodes: [a, b]}\n";
        let err = ClusterTopology::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(ref m) if m.contains("undeclared node b")));
    }

    #[test]
    fn test_repeated_partition_member_rejected() {
        let doc = "nodes:\n  - {address: a, thread_count: 4}\n  - {address: b, thread_count: 4}\npartitions:\n  p: {nodes: [a, a, b]}\n";
        let err = ClusterTopology::from_yaml_str(doc).unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(ref m) if m.contains("node a more than once")));
    }

    #[test]
    fn test_bad_thread_counts_rejected() {
        let missing = "nodes:\n  - {address: a}\n";
        assert!(matches!(
            ClusterTopology::from_yaml_str(missing),
            Err(OrchestratorError::Config(_))
        ));

        let zero = "nodes:\n  - {address: a, thread_count: 0}\n";
        assert!(matches!(
            ClusterTopology::from_yaml_str(zero),
            Err(OrchestratorError::Config(_))
        ));

        let negative = "nodes:\n  - {address: a, thread_count: -2}\n";
        assert!(matches!(
            ClusterTopology::from_yaml_str(negative),
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_unparsable_and_duplicates_rejected() {
        assert!(ClusterTopology::from_yaml_str("nodes: [[[").is_err());

        let dup = "nodes:\n  - {address: a, thread_count: 4}\n  - {address: a, thread_count: 4}\n";
        assert!(ClusterTopology::from_yaml_str(dup).is_err());
    }

    #[test]
    fn test_json_document_accepted() {
        let doc = r#"{"nodes": [{"address": "a", "thread_count": 2}],
                      "partitions": {"p": {"nodes": ["a"]}}}"#;
        let topo = ClusterTopology::from_yaml_str(doc).unwrap();
        assert_eq!(topo.partition_nodes("p").unwrap().len(), 1);
    }
}
