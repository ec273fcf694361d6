use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The numeric identifier of a relay as reported in telemetry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayId(i64);

impl RelayId {
    /// Creates a relay id from its numeric value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the numeric value of this id.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A configured relay, identified by its id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelayNode {
    /// The id reported in telemetry.
    pub id: RelayId,
    /// The address under which the relay is exported.
    pub address: String,
}

/// Static lookup of known relays.
///
/// Created once from configuration and never modified afterwards. Readings for relay ids that are
/// not in the registry are not recorded.
#[derive(Clone, Debug, Default)]
pub struct RelayRegistry {
    nodes: BTreeMap<RelayId, String>,
}

impl RelayRegistry {
    /// Creates a registry from a list of relay nodes.
    ///
    /// If an id occurs more than once, the last node wins.
    pub fn new(nodes: impl IntoIterator<Item = RelayNode>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.id, node.address))
            .collect();

        Self { nodes }
    }

    /// Creates a registry from a map of numeric ids to addresses, as found in configuration.
    pub fn from_map(nodes: &BTreeMap<i64, String>) -> Self {
        let nodes = nodes
            .iter()
            .map(|(&id, address)| (RelayId(id), address.clone()))
            .collect();

        Self { nodes }
    }

    /// Returns `true` if the relay is known.
    pub fn contains(&self, id: RelayId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Iterates all known relays in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (RelayId, &str)> + '_ {
        self.nodes.iter().map(|(&id, address)| (id, address.as_str()))
    }

    /// Returns the number of known relays.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no relays are configured.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_last_node_wins() {
        let registry = RelayRegistry::new([
            RelayNode {
                id: RelayId::new(1),
                address: "10.0.0.1".to_owned(),
            },
            RelayNode {
                id: RelayId::new(1),
                address: "10.0.0.2".to_owned(),
            },
        ]);

        let nodes: Vec<_> = registry.iter().collect();
        assert_eq!(nodes, vec![(RelayId::new(1), "10.0.0.2")]);
    }

    #[test]
    fn test_iter_sorted() {
        let map = BTreeMap::from([(9, "c".to_owned()), (-1, "a".to_owned()), (3, "b".to_owned())]);
        let registry = RelayRegistry::from_map(&map);

        let ids: Vec<_> = registry.iter().map(|(id, _)| id.value()).collect();
        assert_eq!(ids, vec![-1, 3, 9]);
        assert!(!registry.contains(RelayId::new(4)));
    }
}
