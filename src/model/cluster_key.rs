//! Cluster key grammars.
//!
//! Two key shapes are understood, distinguished by a literal direction prefix:
//!
//! ```text
//! outbound|<port>|<subset>|<host>          subset style
//! <host>|<port-name>[,...][|<labels>[;...]] legacy service key
//! ```

use std::fmt;

use crate::model::labels::{Labels, LabelsCollection};

/// Traffic direction of a subset-style key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed cluster key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterKey {
    Subset {
        direction: Direction,
        /// Port name as written in the key.
        port_name: String,
        /// Port number, when the port part is numeric.
        port_number: Option<u16>,
        subset: String,
        hostname: String,
    },
    Service {
        hostname: String,
        port_names: Vec<String>,
        labels: LabelsCollection,
    },
}

impl ClusterKey {
    /// Parse a cluster key. Returns `None` for malformed keys.
    pub fn parse(key: &str) -> Option<Self> {
        // Only an exact direction word in the first field selects the subset grammar.
        let direction = match key.split('|').next() {
            Some(first) if first == Direction::Outbound.as_str() => Some(Direction::Outbound),
            Some(first) if first == Direction::Inbound.as_str() => Some(Direction::Inbound),
            _ => None,
        };

        match direction {
            Some(direction) => Self::parse_subset(direction, key),
            None => Self::parse_service(key),
        }
    }

    fn parse_subset(direction: Direction, key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split('|').collect();
        if parts.len() < 4 || parts[0] != direction.as_str() || parts[3].is_empty() {
            return None;
        }
        Some(ClusterKey::Subset {
            direction,
            port_name: parts[1].to_string(),
            port_number: parts[1].parse().ok(),
            subset: parts[2].to_string(),
            hostname: parts[3].to_string(),
        })
    }

    fn parse_service(key: &str) -> Option<Self> {
        let mut parts = key.split('|');
        let hostname = parts.next().filter(|h| !h.is_empty())?.to_string();

        let port_names = match parts.next() {
            Some(names) => names.split(',').map(str::to_string).collect(),
            None => vec![String::new()],
        };

        let labels = match parts.next() {
            Some(tags) if !tags.is_empty() => {
                LabelsCollection::new(tags.split(';').map(Labels::parse).collect())
            }
            _ => LabelsCollection::default(),
        };

        Some(ClusterKey::Service {
            hostname,
            port_names,
            labels,
        })
    }

    pub fn hostname(&self) -> &str {
        match self {
            ClusterKey::Subset { hostname, .. } | ClusterKey::Service { hostname, .. } => hostname,
        }
    }
}

/// A registry lookup derived from a cluster key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterQuery {
    pub hostname: String,
    pub port_names: Vec<String>,
    pub labels: LabelsCollection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subset_key() {
        let key = ClusterKey::parse("outbound|http|v1|hello.default.svc.cluster.local").unwrap();
        assert_eq!(
            key,
            ClusterKey::Subset {
                direction: Direction::Outbound,
                port_name: "http".into(),
                port_number: None,
                subset: "v1".into(),
                hostname: "hello.default.svc.cluster.local".into(),
            }
        );

        let numeric = ClusterKey::parse("inbound|9080||reviews").unwrap();
        match numeric {
            ClusterKey::Subset {
                direction,
                port_number,
                subset,
                ..
            } => {
                assert_eq!(direction, Direction::Inbound);
                assert_eq!(port_number, Some(9080));
                assert!(subset.is_empty());
            }
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn test_parse_legacy_key() {
        let key = ClusterKey::parse("hello.default.svc.cluster.local|http").unwrap();
        assert_eq!(
            key,
            ClusterKey::Service {
                hostname: "hello.default.svc.cluster.local".into(),
                port_names: vec!["http".into()],
                labels: LabelsCollection::default(),
            }
        );

        let bare = ClusterKey::parse("hello").unwrap();
        assert_eq!(bare.hostname(), "hello");
        match bare {
            ClusterKey::Service { port_names, .. } => assert_eq!(port_names, vec![String::new()]),
            other => panic!("unexpected key {other:?}"),
        }

        let labelled = ClusterKey::parse("hello|http,grpc|version=v1;version=v2").unwrap();
        match labelled {
            ClusterKey::Service {
                port_names, labels, ..
            } => {
                assert_eq!(port_names, vec!["http".to_string(), "grpc".to_string()]);
                assert_eq!(labels.iter().count(), 2);
            }
            other => panic!("unexpected key {other:?}"),
        }
    }

    #[test]
    fn test_direction_word_must_be_whole_field() {
        let key = ClusterKey::parse("inbound-gateway.istio-system.svc.cluster.local|http").unwrap();
        assert_eq!(
            key,
            ClusterKey::Service {
                hostname: "inbound-gateway.istio-system.svc.cluster.local".into(),
                port_names: vec!["http".into()],
                labels: LabelsCollection::default(),
            }
        );

        let outbound = ClusterKey::parse("outboundx|http|v1|host").unwrap();
        assert_eq!(outbound.hostname(), "outboundx");
        assert!(matches!(outbound, ClusterKey::Service { .. }));
    }

    #[test]
    fn test_malformed_keys() {
        assert!(ClusterKey::parse("outbound|http|v1").is_none());
        assert!(ClusterKey::parse("outbound|http|v1|").is_none());
        assert!(ClusterKey::parse("").is_none());
        assert!(ClusterKey::parse("|http").is_none());
    }
}
