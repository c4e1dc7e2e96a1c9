use std::path::PathBuf;

use workflow_compiler::{
    domain::{
        compiler::{CompileOptions, FilterLevel, compile, process_graph},
        edge::{Edge, LinkProcess, PortRef},
        graph::WorkflowGraph,
        node::Node,
        resources::ResourceAssignment,
        synthesizer::launch::LaunchStrategy,
    },
    error::Error,
};

fn output_dir(test: &str) -> PathBuf {
    std::env::temp_dir().join(format!("workflow_compiler_{}_{}", test, std::process::id()))
}

fn prod_link_con(link_ranks: usize) -> WorkflowGraph {
    let mut graph = WorkflowGraph::new();
    let con_start = 4 + link_ranks;
    graph.add_node(Node::new("prod", ResourceAssignment::explicit(0, 4), "prod", "./prod")).unwrap();
    graph.add_node(Node::new("con", ResourceAssignment::explicit(con_start, 2), "con", "./con")).unwrap();

    let link = LinkProcess::new("dflow", "./libmod_dflow.so", "count", "./dflow");
    let edge = Edge::routed(PortRef::new("prod", "out"), PortRef::new("con", "in"), ResourceAssignment::explicit(4, link_ranks), "count", link);
    graph.add_edge(edge).unwrap();
    graph
}

#[test]
fn test_prod_link_con_descriptor() {
    let options = CompileOptions::new("linear").with_filter_level(FilterLevel::DeclarationOnly);
    let compiled = compile(prod_link_con(2), &options).unwrap();
    let workflow = &compiled.descriptor.workflow;

    assert_eq!(workflow.nodes.len(), 2);
    assert_eq!((workflow.nodes[0].start_proc, workflow.nodes[0].nprocs), (0, 4));
    assert_eq!((workflow.nodes[1].start_proc, workflow.nodes[1].nprocs), (6, 2));

    assert_eq!(workflow.edges.len(), 1);
    let edge = &workflow.edges[0];
    assert_eq!((edge.start_proc, edge.nprocs), (4, 2));
    assert_eq!(edge.transport, "generic");
    assert_eq!((edge.source_port.as_str(), edge.target_port.as_str()), ("out", "in"));
    assert_eq!(edge.keys, None);

    // no contract on either side
    assert!(!compiled.warnings.is_empty());
}

#[test]
fn test_prod_link_con_script() {
    let compiled = compile(prod_link_con(2), &CompileOptions::new("linear")).unwrap();
    assert_eq!(compiled.launch.strategy, LaunchStrategy::Mpmd);

    let artifacts = compiled.artifacts().unwrap();
    let script = artifacts.iter().find(|artifact| artifact.file_name == "linear.sh").unwrap();
    assert!(script.executable);
    assert_eq!(script.contents, "#! /bin/bash\n\nmpirun --hostfile hostfile_workflow.txt -np 4 ./prod : -np 2 ./dflow : -np 2 ./con\n");

    let hostfile = artifacts.iter().find(|artifact| artifact.file_name == "hostfile_workflow.txt").unwrap();
    assert_eq!(hostfile.contents.lines().count(), 8);
}

#[test]
fn test_direct_edge_has_two_segments() {
    // the consumer starts at 4 once the link holds no rank
    let compiled = compile(prod_link_con(0), &CompileOptions::new("direct")).unwrap();
    let script = &compiled.launch.artifacts[0].contents;
    assert_eq!(script.matches("-np").count(), 2);
    assert!(script.find("./prod").unwrap() < script.find("./con").unwrap());
    assert_eq!(compiled.descriptor.workflow.edges[0].func, None);
}

#[test]
fn test_gap_in_ranks() {
    let mut graph = WorkflowGraph::new();
    graph.add_node(Node::new("prod", ResourceAssignment::explicit(0, 4), "prod", "./prod")).unwrap();
    graph.add_node(Node::new("con", ResourceAssignment::explicit(6, 2), "con", "./con")).unwrap();
    graph.add_edge(Edge::direct(PortRef::new("prod", "out"), PortRef::new("con", "in"), "count")).unwrap();

    let result = compile(graph, &CompileOptions::new("gap"));
    assert!(matches!(result, Err(Error::UnassignedRanksError { first: 4, end: 6 })));
}

#[test]
fn test_zero_rank_task() {
    let mut graph = WorkflowGraph::new();
    graph.add_node(Node::new("prod", ResourceAssignment::explicit(0, 4), "prod", "./prod")).unwrap();
    graph.add_node(Node::new("idle", ResourceAssignment::explicit(4, 0), "idle", "./idle")).unwrap();

    let result = compile(graph, &CompileOptions::new("idle"));
    assert!(matches!(result, Err(Error::ZeroRankTaskError(name)) if name == "idle"));
}

#[test]
fn test_process_graph_writes_artifacts() {
    let dir = output_dir("write");
    let options = CompileOptions::new("linear").with_output_dir(&dir);
    let compiled = process_graph(prod_link_con(2), &options).unwrap();

    let descriptor: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(dir.join("linear.json")).unwrap()).unwrap();
    assert_eq!(descriptor["workflow"]["nodes"][1]["startProc"], 6);
    assert_eq!(descriptor["workflow"]["edges"][0]["transport"], "generic");
    assert!(dir.join("hostfile_workflow.txt").exists());

    let script = std::fs::read_to_string(dir.join("linear.sh")).unwrap();
    assert_eq!(script, compiled.launch.artifacts[0].contents);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.join("linear.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o555, 0o555);
    }
}
