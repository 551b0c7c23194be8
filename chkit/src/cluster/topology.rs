// chkit/src/cluster/topology.rs
//
// Startup description of the cluster: which hosts exist and which priority
// tier each one belongs to. One variant per accepted shape.
//

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Host;
use crate::errors::{ClickHouseError, Result};

/// Priority given to hosts whose shape carries no explicit priority.
pub const DEFAULT_PRIORITY: u32 = 1;

/// Priority given to hosts outside the local datacenter.
pub const REMOTE_PRIORITY: u32 = 2;

/// Hosts sharing one priority tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub priority: u32,
    pub hosts: Vec<String>,
}

/// Initial cluster layout.
///
/// ```yaml
/// topology:
///   tiers:
///     - priority: 1
///       hosts: ["ch-1:8123", "ch-2:8123"]
///     - priority: 2
///       hosts: ["ch-dr:8123"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TopologyRepr", into = "TopologyRepr")]
pub enum Topology {
    /// One host at the default priority.
    Single(String),
    /// Hosts in preference order; priority is the position in the list.
    List(Vec<String>),
    /// Interchangeable hosts, all at the default priority.
    Set(Vec<String>),
    /// Explicit priority to hosts mapping.
    Tiers(Vec<Tier>),
    /// Explicit host to priority mapping.
    Priorities(BTreeMap<String, u32>),
}

/// Wire form of [`Topology`]: a map with exactly one shape key, so plain
/// YAML maps and the `config` crate both read it.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TopologyRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    single: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    set: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tiers: Option<Vec<Tier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priorities: Option<BTreeMap<String, u32>>,
}

impl TryFrom<TopologyRepr> for Topology {
    type Error = String;

    fn try_from(repr: TopologyRepr) -> std::result::Result<Self, Self::Error> {
        let mut shapes = Vec::new();
        if let Some(addr) = repr.single {
            shapes.push(Topology::Single(addr));
        }
        if let Some(addrs) = repr.list {
            shapes.push(Topology::List(addrs));
        }
        if let Some(addrs) = repr.set {
            shapes.push(Topology::Set(addrs));
        }
        if let Some(tiers) = repr.tiers {
            shapes.push(Topology::Tiers(tiers));
        }
        if let Some(map) = repr.priorities {
            shapes.push(Topology::Priorities(map));
        }
        match shapes.len() {
            1 => Ok(shapes.remove(0)),
            0 => Err("topology needs one of single, list, set, tiers or priorities".to_string()),
            n => Err(format!("topology has {} shapes, expected exactly one", n)),
        }
    }
}

impl From<Topology> for TopologyRepr {
    fn from(topology: Topology) -> Self {
        let mut repr = TopologyRepr::default();
        match topology {
            Topology::Single(addr) => repr.single = Some(addr),
            Topology::List(addrs) => repr.list = Some(addrs),
            Topology::Set(addrs) => repr.set = Some(addrs),
            Topology::Tiers(tiers) => repr.tiers = Some(tiers),
            Topology::Priorities(map) => repr.priorities = Some(map),
        }
        repr
    }
}

impl Topology {
    /// Parse a YAML topology document. Any malformed shape is a
    /// `ConfigError`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ClickHouseError::ConfigError(format!("invalid topology: {}", e)))
    }

    /// Build a topology relative to the datacenter this process runs in:
    /// hosts of `local_dc` get priority 1, every other datacenter priority 2.
    pub fn relative_to_datacenter(
        datacenters: &BTreeMap<String, Vec<String>>,
        local_dc: &str,
    ) -> Self {
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for (dc, hosts) in datacenters {
            if dc == local_dc {
                local.extend(hosts.iter().cloned());
            } else {
                remote.extend(hosts.iter().cloned());
            }
        }

        let mut tiers = Vec::new();
        if !local.is_empty() {
            tiers.push(Tier { priority: DEFAULT_PRIORITY, hosts: local });
        }
        if !remote.is_empty() {
            tiers.push(Tier { priority: REMOTE_PRIORITY, hosts: remote });
        }
        Topology::Tiers(tiers)
    }

    /// Whether the shape assigns priorities itself rather than taking them
    /// from the caller.
    pub fn has_explicit_priority(&self) -> bool {
        matches!(self, Topology::Tiers(_) | Topology::Priorities(_))
    }

    /// Flatten to `(priority, host)` pairs in declaration order.
    pub fn entries(&self) -> Vec<(u32, Host)> {
        match self {
            Topology::Single(addr) => vec![(DEFAULT_PRIORITY, Host::new(addr))],
            Topology::List(addrs) => addrs
                .iter()
                .enumerate()
                .map(|(i, addr)| (i as u32, Host::new(addr)))
                .collect(),
            Topology::Set(addrs) => {
                let mut seen = Vec::with_capacity(addrs.len());
                for addr in addrs {
                    let host = Host::new(addr);
                    if !seen.iter().any(|(_, h)| h == &host) {
                        seen.push((DEFAULT_PRIORITY, host));
                    }
                }
                seen
            }
            Topology::Tiers(tiers) => tiers
                .iter()
                .flat_map(|tier| {
                    tier.hosts
                        .iter()
                        .map(move |addr| (tier.priority, Host::new(addr)))
                })
                .collect(),
            Topology::Priorities(map) => map
                .iter()
                .map(|(addr, priority)| (*priority, Host::new(addr)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Topology::Single(addr) => addr.trim().is_empty(),
            Topology::List(addrs) | Topology::Set(addrs) => addrs.is_empty(),
            Topology::Tiers(tiers) => tiers.iter().all(|t| t.hosts.is_empty()),
            Topology::Priorities(map) => map.is_empty(),
        }
    }
}

impl From<&str> for Topology {
    fn from(addr: &str) -> Self {
        Topology::Single(addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(entries: &[(u32, Host)]) -> Vec<(u32, &str)> {
        entries.iter().map(|(p, h)| (*p, h.url())).collect()
    }

    #[test]
    fn test_list_priority_follows_position() {
        let topo = Topology::List(vec!["a:8123".into(), "b:8123".into(), "c:8123".into()]);
        assert_eq!(
            hosts(&topo.entries()),
            vec![(0, "http://a:8123"), (1, "http://b:8123"), (2, "http://c:8123")]
        );
        assert!(!topo.has_explicit_priority());
    }

    #[test]
    fn test_set_collapses_duplicates() {
        let topo = Topology::Set(vec!["a".into(), "http://a".into(), "b".into()]);
        assert_eq!(hosts(&topo.entries()), vec![(1, "http://a"), (1, "http://b")]);
    }

    #[test]
    fn test_relative_topology() {
        let mut dcs = BTreeMap::new();
        dcs.insert("eu".to_string(), vec!["eu-1".to_string(), "eu-2".to_string()]);
        dcs.insert("us".to_string(), vec!["us-1".to_string()]);
        dcs.insert("ap".to_string(), vec!["ap-1".to_string()]);

        let topo = Topology::relative_to_datacenter(&dcs, "eu");
        assert_eq!(
            topo,
            Topology::Tiers(vec![
                Tier { priority: 1, hosts: vec!["eu-1".into(), "eu-2".into()] },
                Tier { priority: 2, hosts: vec!["ap-1".into(), "us-1".into()] },
            ])
        );
    }

    #[test]
    fn test_deserialize_shapes() {
        let topo: Topology = serde_yaml::from_str("single: localhost:8123").unwrap();
        assert_eq!(topo, Topology::Single("localhost:8123".into()));

        let topo: Topology = serde_yaml::from_str("priorities:\n  a: 1\n  b: 3\n").unwrap();
        assert_eq!(hosts(&topo.entries()), vec![(1, "http://a"), (3, "http://b")]);

        let topo: Topology =
            serde_yaml::from_str("tiers:\n  - priority: 5\n    hosts: [x, y]\n").unwrap();
        assert_eq!(hosts(&topo.entries()), vec![(5, "http://x"), (5, "http://y")]);
    }

    #[test]
    fn test_deserialize_rejects_mixed_priority_map() {
        // host -> priority with a non-integer priority is not a valid shape
        let res: std::result::Result<Topology, _> =
            serde_yaml::from_str("priorities:\n  a: 1\n  b: [c]\n");
        assert!(res.is_err());

        let res: std::result::Result<Topology, _> = serde_yaml::from_str("cluster: [a, b]");
        assert!(res.is_err());
    }

    #[test]
    fn test_malformed_shapes_are_config_errors() {
        for yaml in [
            "priorities:\n  a: 1\n  b: [c]\n",
            "cluster: [a, b]",
            "single: a\nlist: [b]\n",
            "{}",
            "- a\n- b\n",
        ] {
            assert!(
                matches!(Topology::from_yaml_str(yaml), Err(ClickHouseError::ConfigError(_))),
                "accepted {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_serializes_as_single_key_map() {
        let topo = Topology::Tiers(vec![Tier { priority: 2, hosts: vec!["x".into()] }]);
        let yaml = serde_yaml::to_string(&topo).unwrap();
        assert_eq!(yaml, "tiers:\n- priority: 2\n  hosts:\n  - x\n");
        assert_eq!(Topology::from_yaml_str(&yaml).unwrap(), topo);
    }
}
