use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;

use slotmap::{SlotMap, new_key_type};

use crate::domain::utils::id::TopologyName;
use crate::error::{Error, Result};

/// Host used for every rank when no host list is given.
pub const LOCALHOST: &str = "localhost";

new_key_type! {
    pub struct TopologyKey;
}

/// A contiguous range of process ranks together with the host each rank runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub name: TopologyName,

    /// Total number of ranks in the topology.
    pub nprocs: usize,

    /// Global rank of the first rank in this topology.
    pub offset_rank: usize,

    /// One host per rank, `hostlist.len() == nprocs`.
    pub hostlist: Vec<String>,

    /// Ranks allowed per host when pinning processes. 0 means no limit.
    pub procs_per_node: usize,

    /// First core used on each host when pinning processes.
    pub offset_proc_per_node: usize,

    /// Topology this one was carved out of, `None` for root allocations.
    pub parent: Option<TopologyKey>,
}

impl Topology {
    fn new(name: &str, nprocs: usize, offset_rank: usize, hostlist: Vec<String>, parent: Option<TopologyKey>) -> Self {
        Self { name: TopologyName::new(name), nprocs, offset_rank, hostlist, procs_per_node: 0, offset_proc_per_node: 0, parent }
    }

    pub fn is_initialized(&self) -> bool {
        self.nprocs > 0
    }

    /// Global ranks covered by this topology.
    pub fn rank_range(&self) -> Range<usize> {
        self.offset_rank..self.offset_rank + self.nprocs
    }

    /// Distinct hosts, in order of first appearance.
    pub fn nodes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.hostlist.iter().map(String::as_str).filter(|host| seen.insert(*host)).collect()
    }

    fn child(&self, name: &str, relative_offset: usize, nprocs: usize, parent: TopologyKey) -> Topology {
        let hostlist = self.hostlist[relative_offset..relative_offset + nprocs].to_vec();
        let mut child = Topology::new(name, nprocs, self.offset_rank + relative_offset, hostlist, Some(parent));
        child.procs_per_node = self.procs_per_node;
        child.offset_proc_per_node = self.offset_proc_per_node;
        child
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "nprocs: {}", self.nprocs)?;
        writeln!(f, "offsetRank: {}", self.offset_rank)?;
        write!(f, "host list: {:?}", self.hostlist)
    }
}

/// Round-robin extension (or truncation) of a host list to exactly `nprocs` entries.
///
/// `[host1, host2]` with `nprocs = 4` becomes `[host1, host2, host1, host2]`.
pub fn expand_hostlist(hosts: &[String], nprocs: usize) -> Vec<String> {
    if hosts.is_empty() {
        return vec![LOCALHOST.to_string(); nprocs];
    }
    (0..nprocs).map(|i| hosts[i % hosts.len()].clone()).collect()
}

/// Owns every topology declared for one workflow.
///
/// Declaration order is kept explicitly because re-ranking depends on it.
#[derive(Debug, Default)]
pub struct TopologyStore {
    slots: SlotMap<TopologyKey, Topology>,

    /// Index lookup using the topology name.
    name_index: HashMap<TopologyName, TopologyKey>,

    /// Keys in the order the topologies were created.
    order: Vec<TopologyKey>,

    /// Set once a host subset was derived, offsets are no longer contiguous.
    needs_reranking: bool,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, topology: Topology) -> Result<TopologyKey> {
        if self.name_index.contains_key(&topology.name) {
            return Err(Error::DuplicateNameError(topology.name.id));
        }
        log::debug!("Declared topology '{}' with {} ranks at offset {}", topology.name, topology.nprocs, topology.offset_rank);

        let name = topology.name.clone();
        let key = self.slots.insert(topology);
        self.name_index.insert(name, key);
        self.order.push(key);
        Ok(key)
    }

    fn lookup(&self, key: TopologyKey) -> Result<&Topology> {
        self.slots.get(key).ok_or_else(|| Error::UnknownTopologyError(format!("{:?}", key)))
    }

    pub fn get(&self, key: TopologyKey) -> Option<&Topology> {
        self.slots.get(key)
    }

    pub fn get_by_name(&self, name: &str) -> Option<TopologyKey> {
        self.name_index.get(&TopologyName::new(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Topologies in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (TopologyKey, &Topology)> {
        self.order.iter().filter_map(|key| self.slots.get(*key).map(|topology| (*key, topology)))
    }

    pub fn needs_reranking(&self) -> bool {
        self.needs_reranking
    }

    /// Root allocation of `nprocs` ranks, all on the local host.
    pub fn allocate(&mut self, name: &str, nprocs: usize) -> Result<TopologyKey> {
        self.insert(Topology::new(name, nprocs, 0, vec![LOCALHOST.to_string(); nprocs], None))
    }

    /// Root allocation from an explicit host list.
    ///
    /// Without `nprocs` there is one rank per listed host. A shorter list is expanded round-robin.
    pub fn allocate_with_hosts(&mut self, name: &str, hosts: Vec<String>, nprocs: Option<usize>) -> Result<TopologyKey> {
        if hosts.is_empty() {
            return Err(Error::InsufficientResourcesError { topology: name.to_string(), reason: "the host list is empty".to_string() });
        }
        let nprocs = nprocs.unwrap_or(hosts.len());
        self.insert(Topology::new(name, nprocs, 0, expand_hostlist(&hosts, nprocs), None))
    }

    /// Root allocation from a host file with one host name per line.
    pub fn allocate_from_hostfile(&mut self, name: &str, path: impl AsRef<Path>, nprocs: Option<usize>) -> Result<TopologyKey> {
        let content = fs::read_to_string(path.as_ref())?;
        let hosts: Vec<String> = content.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect();
        log::info!("Read {} hosts from '{}'", hosts.len(), path.as_ref().display());
        self.allocate_with_hosts(name, hosts, nprocs)
    }

    /// Sets the core pinning parameters used by rank files.
    pub fn set_process_pinning(&mut self, key: TopologyKey, procs_per_node: usize, offset_proc_per_node: usize) -> Result<()> {
        let topology = self.slots.get_mut(key).ok_or_else(|| Error::UnknownTopologyError(format!("{:?}", key)))?;
        topology.procs_per_node = procs_per_node;
        topology.offset_proc_per_node = offset_proc_per_node;
        Ok(())
    }

    /// Carves one topology of `nprocs` ranks starting `offset` ranks into `parent`.
    pub fn sub_topology(&mut self, parent: TopologyKey, name: &str, nprocs: usize, offset: usize) -> Result<TopologyKey> {
        let parent_topology = self.lookup(parent)?;
        if offset + nprocs > parent_topology.nprocs {
            return Err(Error::InsufficientResourcesError {
                topology: parent_topology.name.id.clone(),
                reason: format!("asked {}, given {}", offset + nprocs, parent_topology.nprocs),
            });
        }
        let child = parent_topology.child(name, offset, nprocs, parent);
        self.insert(child)
    }

    /// Splits `parent` into consecutive, non-overlapping children, one per name.
    pub fn split(&mut self, parent: TopologyKey, names: &[&str], sizes: &[usize]) -> Result<Vec<TopologyKey>> {
        let parent_topology = self.lookup(parent)?;
        if names.len() != sizes.len() {
            return Err(Error::InsufficientResourcesError {
                topology: parent_topology.name.id.clone(),
                reason: format!("{} names are given for {} sizes", names.len(), sizes.len()),
            });
        }
        let requested: usize = sizes.iter().sum();
        if requested > parent_topology.nprocs {
            return Err(Error::InsufficientResourcesError {
                topology: parent_topology.name.id.clone(),
                reason: format!("asked {}, given {}", requested, parent_topology.nprocs),
            });
        }

        let mut offset = 0;
        let mut children = Vec::with_capacity(names.len());
        for (name, &nprocs) in names.iter().zip(sizes) {
            children.push(parent_topology.child(name, offset, nprocs, parent));
            offset += nprocs;
        }

        children.into_iter().map(|child| self.insert(child)).collect()
    }

    /// Same as [`TopologyStore::split`] with `(name, size)` entries, keyed by name.
    pub fn split_by_named_sizes(&mut self, parent: TopologyKey, entries: &[(&str, usize)]) -> Result<HashMap<String, TopologyKey>> {
        let names: Vec<&str> = entries.iter().map(|(name, _)| *name).collect();
        let sizes: Vec<usize> = entries.iter().map(|(_, size)| *size).collect();
        let keys = self.split(parent, &names, &sizes)?;
        Ok(names.into_iter().map(String::from).zip(keys).collect())
    }

    /// Keeps the ranks of `parent` placed on one of `hosts`.
    pub fn derive_subset(&mut self, parent: TopologyKey, name: &str, hosts: &[&str]) -> Result<TopologyKey> {
        self.host_subset(parent, name, hosts, true)
    }

    /// Keeps the ranks of `parent` placed on any host except `hosts`.
    pub fn remove_subset(&mut self, parent: TopologyKey, name: &str, hosts: &[&str]) -> Result<TopologyKey> {
        self.host_subset(parent, name, hosts, false)
    }

    fn host_subset(&mut self, parent: TopologyKey, name: &str, hosts: &[&str], keep: bool) -> Result<TopologyKey> {
        let parent_topology = self.lookup(parent)?;
        let known: HashSet<&str> = parent_topology.nodes().into_iter().collect();
        if let Some(host) = hosts.iter().find(|host| !known.contains(**host)) {
            return Err(Error::UnknownHostError { topology: parent_topology.name.id.clone(), host: host.to_string() });
        }

        let selected: HashSet<&str> = hosts.iter().copied().collect();
        let ranks: Vec<usize> =
            (0..parent_topology.nprocs).filter(|&rank| selected.contains(parent_topology.hostlist[rank].as_str()) == keep).collect();
        if ranks.is_empty() {
            log::warn!("Topology '{}' derived from '{}' has no rank left", name, parent_topology.name);
        }

        let hostlist = ranks.iter().map(|&rank| parent_topology.hostlist[rank].clone()).collect();
        let offset_rank = parent_topology.offset_rank + ranks.first().copied().unwrap_or(0);
        let mut child = Topology::new(name, ranks.len(), offset_rank, hostlist, Some(parent));
        child.procs_per_node = parent_topology.procs_per_node;
        child.offset_proc_per_node = parent_topology.offset_proc_per_node;

        let key = self.insert(child)?;
        self.needs_reranking = true;
        Ok(key)
    }

    /// Declaration-ordered, de-duplicated copy of `keys`.
    pub fn declaration_order(&self, keys: &[TopologyKey]) -> Vec<TopologyKey> {
        let wanted: HashSet<TopologyKey> = keys.iter().copied().collect();
        self.order.iter().copied().filter(|key| wanted.contains(key)).collect()
    }

    /// Reassigns the offsets of `keys` as a running sum of their sizes, in declaration order.
    ///
    /// Does nothing unless a host subset was derived. Returns whether offsets were rewritten.
    pub fn finalize_ranking(&mut self, keys: &[TopologyKey]) -> bool {
        if !self.needs_reranking {
            return false;
        }

        let mut offset = 0;
        for key in self.declaration_order(keys) {
            if let Some(topology) = self.slots.get_mut(key) {
                topology.offset_rank = offset;
                offset += topology.nprocs;
                log::debug!("Re-ranked topology '{}' to offset {}", topology.name, topology.offset_rank);
            }
        }
        log::info!("Re-ranked {} topologies over {} ranks", keys.len(), offset);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_expand_hostlist_round_robin() {
        assert_eq!(expand_hostlist(&hosts(&["a", "b"]), 5), hosts(&["a", "b", "a", "b", "a"]));
        assert_eq!(expand_hostlist(&hosts(&["a", "b", "c"]), 2), hosts(&["a", "b"]));
        assert_eq!(expand_hostlist(&[], 2), hosts(&[LOCALHOST, LOCALHOST]));
    }

    #[test]
    fn test_split_slices_hosts() {
        let mut store = TopologyStore::new();
        let root = store.allocate_with_hosts("root", hosts(&["n1", "n2"]), Some(6)).unwrap();
        let parts = store.split(root, &["prod", "con"], &[3, 2]).unwrap();

        let prod = store.get(parts[0]).unwrap();
        let con = store.get(parts[1]).unwrap();
        assert_eq!(prod.rank_range(), 0..3);
        assert_eq!(prod.hostlist, hosts(&["n1", "n2", "n1"]));
        assert_eq!(con.rank_range(), 3..5);
        assert_eq!(con.hostlist, hosts(&["n2", "n1"]));
        assert_eq!(con.nodes(), vec!["n2", "n1"]);
    }

    #[test]
    fn test_nested_split_offsets_are_global() {
        let mut store = TopologyStore::new();
        let root = store.allocate("root", 10).unwrap();
        let parts = store.split(root, &["a", "b"], &[4, 6]).unwrap();
        let nested = store.split(parts[1], &["b1", "b2"], &[2, 3]).unwrap();

        assert_eq!(store.get(nested[0]).unwrap().rank_range(), 4..6);
        assert_eq!(store.get(nested[1]).unwrap().rank_range(), 6..9);
    }

    #[test]
    fn test_split_rejects_mismatched_lists() {
        let mut store = TopologyStore::new();
        let root = store.allocate("root", 4).unwrap();
        let result = store.split(root, &["a"], &[1, 1]);
        assert!(matches!(result, Err(Error::InsufficientResourcesError { .. })));
    }

    #[test]
    fn test_duplicate_topology_name() {
        let mut store = TopologyStore::new();
        store.allocate("root", 4).unwrap();
        assert!(matches!(store.allocate("root", 2), Err(Error::DuplicateNameError(_))));
    }

    #[test]
    fn test_subset_marks_reranking() {
        let mut store = TopologyStore::new();
        let root = store.allocate_with_hosts("root", hosts(&["n1", "n2", "n3"]), Some(6)).unwrap();
        assert!(!store.needs_reranking());

        let kept = store.derive_subset(root, "n2-only", &["n2"]).unwrap();
        assert!(store.needs_reranking());
        let kept = store.get(kept).unwrap();
        assert_eq!(kept.nprocs, 2);
        assert_eq!(kept.hostlist, hosts(&["n2", "n2"]));
        assert_eq!(kept.offset_rank, 1);
    }

    #[test]
    fn test_unknown_host_in_subset() {
        let mut store = TopologyStore::new();
        let root = store.allocate_with_hosts("root", hosts(&["n1", "n2"]), None).unwrap();
        let result = store.remove_subset(root, "rest", &["n9"]);
        assert!(matches!(result, Err(Error::UnknownHostError { host, .. }) if host == "n9"));
    }

    #[test]
    fn test_finalize_ranking_without_subset_is_noop() {
        let mut store = TopologyStore::new();
        let root = store.allocate("root", 4).unwrap();
        let parts = store.split(root, &["a", "b"], &[2, 2]).unwrap();
        assert!(!store.finalize_ranking(&parts));
        assert_eq!(store.get(parts[1]).unwrap().offset_rank, 2);
    }
}
