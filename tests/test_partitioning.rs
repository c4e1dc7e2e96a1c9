use workflow_compiler::{
    domain::{
        compiler::{CompileOptions, compile},
        edge::{Edge, PortRef},
        graph::WorkflowGraph,
        node::Node,
        resources::ResourceAssignment,
        topology::{TopologyKey, TopologyStore},
    },
    error::Error,
};

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn offsets(store: &TopologyStore, keys: &[TopologyKey]) -> Vec<usize> {
    keys.iter().map(|key| store.get(*key).unwrap().offset_rank).collect()
}

#[test]
fn test_children_stay_inside_parent() {
    let mut store = TopologyStore::new();
    let root = store.allocate_with_hosts("root", hosts(&["n1", "n2", "n3", "n4"]), Some(16)).unwrap();
    let halves = store.split(root, &["left", "right"], &[8, 6]).unwrap();
    let quarters = store.split(halves[0], &["q1", "q2", "q3"], &[3, 3, 2]).unwrap();

    let parent = store.get(halves[0]).unwrap().rank_range();
    let ranges: Vec<_> = quarters.iter().map(|key| store.get(*key).unwrap().rank_range()).collect();
    for (i, range) in ranges.iter().enumerate() {
        assert!(parent.start <= range.start && range.end <= parent.end);
        for other in &ranges[i + 1..] {
            assert!(range.end <= other.start || other.end <= range.start);
        }
    }
    assert!(ranges.iter().map(|range| range.len()).sum::<usize>() <= parent.len());

    // hosts follow the parent slice
    let right = store.get(halves[1]).unwrap();
    assert_eq!(right.hostlist, store.get(root).unwrap().hostlist[8..14].to_vec());
}

#[test]
fn test_split_larger_than_parent() {
    let mut store = TopologyStore::new();
    let root = store.allocate("root", 4).unwrap();
    let result = store.split(root, &["a", "b"], &[3, 2]);
    assert!(matches!(result, Err(Error::InsufficientResourcesError { .. })));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_split_by_named_sizes() {
    let mut store = TopologyStore::new();
    let root = store.allocate("root", 6).unwrap();
    let parts = store.split_by_named_sizes(root, &[("prod", 4), ("con", 2)]).unwrap();

    assert_eq!(store.get(parts["prod"]).unwrap().rank_range(), 0..4);
    assert_eq!(store.get(parts["con"]).unwrap().rank_range(), 4..6);
}

#[test]
fn test_sub_topology_at_offset() {
    let mut store = TopologyStore::new();
    let root = store.allocate_with_hosts("root", hosts(&["a", "b", "c"]), None).unwrap();
    let sub = store.sub_topology(root, "tail", 2, 1).unwrap();
    assert_eq!(store.get(sub).unwrap().hostlist, hosts(&["b", "c"]));
    assert!(matches!(store.sub_topology(root, "too-far", 2, 2), Err(Error::InsufficientResourcesError { .. })));
}

#[test]
fn test_reranking_is_idempotent() {
    let mut store = TopologyStore::new();
    let root = store.allocate_with_hosts("root", hosts(&["n1", "n2"]), Some(6)).unwrap();
    let first = store.derive_subset(root, "on-n2", &["n2"]).unwrap();
    let second = store.remove_subset(root, "off-n2", &["n2"]).unwrap();
    let keys = [first, second];

    assert_eq!(offsets(&store, &keys), vec![1, 0]);
    assert!(store.finalize_ranking(&keys));
    let once = offsets(&store, &keys);
    assert_eq!(once, vec![0, 3]);

    store.finalize_ranking(&keys);
    assert_eq!(offsets(&store, &keys), once);
}

#[test]
fn test_hostfile_allocation() {
    let dir = std::env::temp_dir().join(format!("workflow_compiler_hostfile_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("hosts.txt");
    std::fs::write(&path, "node-a\n\nnode-b\n").unwrap();

    let mut store = TopologyStore::new();
    let root = store.allocate_from_hostfile("root", &path, Some(3)).unwrap();
    assert_eq!(store.get(root).unwrap().hostlist, hosts(&["node-a", "node-b", "node-a"]));

    let missing = store.allocate_from_hostfile("other", dir.join("missing.txt"), None);
    assert!(matches!(missing, Err(Error::IoError(_))));
}

#[test]
fn test_compile_reranks_host_subsets() {
    let mut store = TopologyStore::new();
    let root = store.allocate_with_hosts("root", hosts(&["n1", "n2"]), Some(6)).unwrap();
    let on_n1 = store.derive_subset(root, "on-n1", &["n1"]).unwrap();
    let off_n1 = store.remove_subset(root, "off-n1", &["n1"]).unwrap();
    // interleaved before re-ranking
    assert_eq!(offsets(&store, &[on_n1, off_n1]), vec![0, 1]);

    let mut graph = WorkflowGraph::with_topologies(store);
    graph.add_node(Node::new("sim", ResourceAssignment::Topology(on_n1), "sim", "./sim")).unwrap();
    graph.add_node(Node::new("ana", ResourceAssignment::Topology(off_n1), "ana", "./ana")).unwrap();
    graph.add_edge(Edge::direct(PortRef::new("sim", "out"), PortRef::new("ana", "in"), "count")).unwrap();

    let compiled = compile(graph, &CompileOptions::new("subset")).unwrap();
    let ranges: Vec<_> = compiled.descriptor.workflow.nodes.iter().map(|node| (node.start_proc, node.nprocs)).collect();
    assert_eq!(ranges, vec![(0, 3), (3, 3)]);

    let hostfile = compiled.launch.artifacts.iter().find(|artifact| artifact.file_name == "hostfile_workflow.txt").unwrap();
    assert_eq!(hostfile.contents.lines().collect::<Vec<_>>(), vec!["n1", "n1", "n1", "n2", "n2", "n2"]);
}
