use workflow_compiler::{
    domain::{
        compiler::{CompileOptions, compile},
        edge::{Edge, PortRef, Transport},
        graph::WorkflowGraph,
        node::Node,
        resources::ResourceAssignment,
        synthesizer::{
            Artifact,
            launch::{LaunchStrategy, LauncherConfig},
        },
        topology::TopologyStore,
    },
    error::Error,
};

fn two_nodes(prod_cmd: &str, con_cmd: &str) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    graph.add_node(Node::new("prod", ResourceAssignment::explicit(0, 2), "prod", prod_cmd)).unwrap();
    graph.add_node(Node::new("con", ResourceAssignment::explicit(2, 1), "con", con_cmd)).unwrap();
    graph
}

fn connect(graph: &mut WorkflowGraph, source: &str, target: &str, transport: Transport) {
    let edge = Edge::direct(PortRef::new(source, "out"), PortRef::new(target, "in"), "count").with_transport(transport);
    graph.add_edge(edge).unwrap();
}

fn artifact<'a>(artifacts: &'a [Artifact], file_name: &str) -> &'a Artifact {
    artifacts.iter().find(|artifact| artifact.file_name == file_name).unwrap()
}

#[test]
fn test_shared_executable_is_spmd() {
    let mut graph = two_nodes("./coupled", "./coupled");
    connect(&mut graph, "prod", "con", Transport::Generic);

    let options = CompileOptions::new("spmd").with_launcher(LauncherConfig { path: "/opt/mpi/bin/".to_string(), options: "--oversubscribe".to_string() });
    let compiled = compile(graph, &options).unwrap();

    assert_eq!(compiled.launch.strategy, LaunchStrategy::Spmd);
    assert_eq!(
        artifact(&compiled.launch.artifacts, "spmd.sh").contents,
        "#! /bin/bash\n\n/opt/mpi/bin/mpirun --oversubscribe --hostfile hostfile_workflow.txt -np 3 ./coupled spmd.json\n"
    );
}

#[test]
fn test_mixed_transports() {
    let mut graph = two_nodes("./prod", "./con");
    graph.add_node(Node::new("other", ResourceAssignment::explicit(3, 1), "other", "./other")).unwrap();
    connect(&mut graph, "prod", "con", Transport::Generic);
    let edge = Edge::direct(PortRef::new("prod", "out"), PortRef::new("other", "in"), "count").with_transport(Transport::File);
    graph.add_edge(edge).unwrap();

    let result = compile(graph, &CompileOptions::new("mixed"));
    assert!(matches!(result, Err(Error::MixedTransportError { first, second }) if first == "generic" && second == "file"));
}

#[test]
fn test_file_transport_is_independent() {
    let mut graph = two_nodes("./prod", "./con");
    connect(&mut graph, "prod", "con", Transport::File);
    let compiled = compile(graph, &CompileOptions::new("detached")).unwrap();

    assert_eq!(compiled.launch.strategy, LaunchStrategy::Independent);
    let script = &artifact(&compiled.launch.artifacts, "detached.sh").contents;
    assert!(script.contains("-np 2 --hostfile hostfile_task0 -x DECAF_WORKFLOW_SIZE=3 -x DECAF_WORKFLOW_RANK=0 ./prod &"));
    assert!(script.contains("-np 1 --hostfile hostfile_task1 -x DECAF_WORKFLOW_SIZE=3 -x DECAF_WORKFLOW_RANK=2 ./con &"));
    assert_eq!(artifact(&compiled.launch.artifacts, "hostfile_task1").contents, "localhost");
    assert_eq!(compiled.descriptor.workflow.edges[0].transport, "file");
}

#[test]
fn test_pinned_ranks() {
    let mut topologies = TopologyStore::new();
    let root = topologies.allocate_with_hosts("root", vec!["n1".to_string(), "n2".to_string()], Some(4)).unwrap();
    topologies.set_process_pinning(root, 2, 1).unwrap();
    let parts = topologies.split(root, &["prod", "con"], &[3, 1]).unwrap();

    let mut graph = WorkflowGraph::with_topologies(topologies);
    graph.add_node(Node::new("prod", ResourceAssignment::Topology(parts[0]), "prod", "./prod")).unwrap();
    graph.add_node(Node::new("con", ResourceAssignment::Topology(parts[1]), "con", "./con")).unwrap();
    connect(&mut graph, "prod", "con", Transport::Pinned);

    let compiled = compile(graph, &CompileOptions::new("pinned")).unwrap();
    assert_eq!(compiled.launch.strategy, LaunchStrategy::Pinned);
    assert_eq!(artifact(&compiled.launch.artifacts, "rankfile_workflow.txt").contents, "rank 0=n1 slot=1\nrank 1=n2 slot=1\nrank 2=n1 slot=2\nrank 3=n2 slot=2");
    assert_eq!(artifact(&compiled.launch.artifacts, "hostfile_workflow.txt").contents, "n1\nn2\nn1\nn2");
    assert!(artifact(&compiled.launch.artifacts, "pinned.sh").contents.contains("--rankfile rankfile_workflow.txt -np 3 ./prod : -np 1 ./con"));
    assert_eq!(compiled.descriptor.workflow.edges[0].transport, "generic");
}

#[test]
fn test_pinned_ranks_need_topology() {
    let mut graph = two_nodes("./prod", "./con");
    connect(&mut graph, "prod", "con", Transport::Pinned);
    let result = compile(graph, &CompileOptions::new("pinned"));
    assert!(matches!(result, Err(Error::MissingTopologyError(name)) if name == "prod"));
}

#[test]
fn test_pinned_ranks_exceed_cores() {
    let mut topologies = TopologyStore::new();
    let root = topologies.allocate_with_hosts("root", vec!["n1".to_string()], Some(3)).unwrap();
    topologies.set_process_pinning(root, 2, 0).unwrap();
    let parts = topologies.split(root, &["prod", "con"], &[2, 1]).unwrap();

    let mut graph = WorkflowGraph::with_topologies(topologies);
    graph.add_node(Node::new("prod", ResourceAssignment::Topology(parts[0]), "prod", "./prod")).unwrap();
    graph.add_node(Node::new("con", ResourceAssignment::Topology(parts[1]), "con", "./con")).unwrap();
    connect(&mut graph, "prod", "con", Transport::Pinned);

    assert!(matches!(compile(graph, &CompileOptions::new("pinned")), Err(Error::InsufficientResourcesError { .. })));
}
