use std::ops::Range;

use crate::domain::topology::{LOCALHOST, TopologyKey, TopologyStore};
use crate::error::{Error, Result};

/// Where the ranks of a task or link come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAssignment {
    /// Raw rank range without host information.
    Explicit { start_proc: usize, nprocs: usize },

    /// Ranks and hosts of a declared topology.
    Topology(TopologyKey),
}

impl Default for ResourceAssignment {
    fn default() -> Self {
        ResourceAssignment::Explicit { start_proc: 0, nprocs: 0 }
    }
}

impl ResourceAssignment {
    pub fn explicit(start_proc: usize, nprocs: usize) -> Self {
        ResourceAssignment::Explicit { start_proc, nprocs }
    }

    pub fn topology_key(&self) -> Option<TopologyKey> {
        match self {
            ResourceAssignment::Explicit { .. } => None,
            ResourceAssignment::Topology(key) => Some(*key),
        }
    }

    pub fn rank_range(&self, topologies: &TopologyStore) -> Result<Range<usize>> {
        match self {
            ResourceAssignment::Explicit { start_proc, nprocs } => Ok(*start_proc..start_proc + nprocs),
            ResourceAssignment::Topology(key) => topologies
                .get(*key)
                .map(|topology| topology.rank_range())
                .ok_or_else(|| Error::UnknownTopologyError(format!("{:?}", key))),
        }
    }

    pub fn nprocs(&self, topologies: &TopologyStore) -> Result<usize> {
        Ok(self.rank_range(topologies)?.len())
    }

    /// One host per rank. Explicit ranges run on the local host.
    pub fn hostlist(&self, topologies: &TopologyStore) -> Result<Vec<String>> {
        match self {
            ResourceAssignment::Explicit { nprocs, .. } => Ok(vec![LOCALHOST.to_string(); *nprocs]),
            ResourceAssignment::Topology(key) => topologies
                .get(*key)
                .map(|topology| topology.hostlist.clone())
                .ok_or_else(|| Error::UnknownTopologyError(format!("{:?}", key))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_assignment_uses_localhost() {
        let store = TopologyStore::new();
        let assignment = ResourceAssignment::explicit(4, 2);
        assert_eq!(assignment.rank_range(&store).unwrap(), 4..6);
        assert_eq!(assignment.hostlist(&store).unwrap(), vec![LOCALHOST.to_string(), LOCALHOST.to_string()]);
        assert_eq!(assignment.topology_key(), None);
    }

    #[test]
    fn test_topology_assignment_follows_store() {
        let mut store = TopologyStore::new();
        let root = store.allocate_with_hosts("root", vec!["n1".to_string(), "n2".to_string()], Some(4)).unwrap();
        let parts = store.split(root, &["a", "b"], &[1, 3]).unwrap();

        let assignment = ResourceAssignment::Topology(parts[1]);
        assert_eq!(assignment.rank_range(&store).unwrap(), 1..4);
        assert_eq!(assignment.hostlist(&store).unwrap(), vec!["n2", "n1", "n2"]);
    }
}
