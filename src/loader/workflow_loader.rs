use std::path::Path;

use crate::api::workflow_dto::workflow_dto::{EdgeDto, NodeDto, PortDto, TopologyDeclDto, WorkflowDto};
use crate::domain::compiler::FilterLevel;
use crate::domain::contract::{Contract, ContractLink};
use crate::domain::edge::{Edge, LinkProcess, PortRef, StreamPolicy, Transport};
use crate::domain::graph::WorkflowGraph;
use crate::domain::node::{Node, PortDirection};
use crate::domain::resources::ResourceAssignment;
use crate::domain::topology::{TopologyKey, TopologyStore};
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

/// Callback run by link processes that do not name one.
const DEFAULT_LINK_FUNC: &str = "dflow";

/// A workflow description turned into a graph, with the settings it carries.
#[derive(Debug)]
pub struct WorkflowDefinition {
    pub name: String,
    pub filter_level: Option<FilterLevel>,
    pub graph: WorkflowGraph,
}

/// Reads a workflow description file. Relative host and contract files are resolved against its directory.
pub fn load_workflow(file_path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let file_path = file_path.as_ref();
    let dto: WorkflowDto = parse_json_file(file_path)?;
    log::info!("Parsed workflow description '{}'", file_path.display());

    let base_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
    build_workflow(dto, base_dir)
}

/// Builds the graph in three phases: topologies, nodes, then edges.
pub fn build_workflow(dto: WorkflowDto, base_dir: &Path) -> Result<WorkflowDefinition> {
    let filter_level = dto.filter_level.as_deref().map(str::parse::<FilterLevel>).transpose()?;

    // Phase 1: topologies, in declaration order
    let mut topologies = TopologyStore::new();
    for declaration in &dto.topologies {
        declare_topology(&mut topologies, declaration, base_dir)?;
    }
    let mut graph = WorkflowGraph::with_topologies(topologies);

    // Phase 2: nodes and their ports
    for node_dto in &dto.nodes {
        let node = build_node(&graph, node_dto, base_dir)?;
        graph.add_node(node)?;
    }

    // Phase 3: edges, fan-in is rejected here
    for edge_dto in &dto.edges {
        let edge = build_edge(&graph, edge_dto, base_dir)?;
        graph.add_edge(edge)?;
    }

    log::info!(
        "Built workflow '{}': {} topologies, {} nodes, {} edges",
        dto.name,
        graph.topologies().len(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(WorkflowDefinition { name: dto.name, filter_level, graph })
}

fn topology_key(topologies: &TopologyStore, name: &str) -> Result<TopologyKey> {
    topologies.get_by_name(name).ok_or_else(|| Error::UnknownTopologyError(name.to_string()))
}

fn declare_topology(topologies: &mut TopologyStore, declaration: &TopologyDeclDto, base_dir: &Path) -> Result<()> {
    match declaration {
        TopologyDeclDto::Root { name, nprocs, hosts, hostfile, procs_per_node, offset_proc_per_node } => {
            let key = match (hostfile, hosts.is_empty(), nprocs) {
                (Some(hostfile), _, _) => topologies.allocate_from_hostfile(name, base_dir.join(hostfile), *nprocs)?,
                (None, false, _) => topologies.allocate_with_hosts(name, hosts.clone(), *nprocs)?,
                (None, true, Some(nprocs)) => topologies.allocate(name, *nprocs)?,
                (None, true, None) => {
                    return Err(Error::ModelConstructionError(format!("Topology '{}' needs 'nprocs', 'hosts' or 'hostfile'", name)));
                }
            };
            if procs_per_node.is_some() || offset_proc_per_node.is_some() {
                topologies.set_process_pinning(key, procs_per_node.unwrap_or(0), offset_proc_per_node.unwrap_or(0))?;
            }
        }
        TopologyDeclDto::Split { parent, parts } => {
            let parent = topology_key(topologies, parent)?;
            let entries: Vec<(&str, usize)> = parts.iter().map(|part| (part.name.as_str(), part.nprocs)).collect();
            topologies.split_by_named_sizes(parent, &entries)?;
        }
        TopologyDeclDto::Subset { parent, name, hosts } => {
            let parent = topology_key(topologies, parent)?;
            let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();
            topologies.derive_subset(parent, name, &hosts)?;
        }
        TopologyDeclDto::Complement { parent, name, hosts } => {
            let parent = topology_key(topologies, parent)?;
            let hosts: Vec<&str> = hosts.iter().map(String::as_str).collect();
            topologies.remove_subset(parent, name, &hosts)?;
        }
    }
    Ok(())
}

fn resources(graph: &WorkflowGraph, owner: &str, topology: &Option<String>, start_proc: Option<usize>, nprocs: Option<usize>) -> Result<Option<ResourceAssignment>> {
    match (topology, nprocs) {
        (Some(topology), _) => {
            if start_proc.is_some() || nprocs.is_some() {
                log::warn!("'{}' uses topology '{}', its explicit rank range is ignored", owner, topology);
            }
            Ok(Some(ResourceAssignment::Topology(topology_key(graph.topologies(), topology)?)))
        }
        (None, Some(nprocs)) => Ok(Some(ResourceAssignment::explicit(start_proc.unwrap_or(0), nprocs))),
        (None, None) => Ok(None),
    }
}

fn port_contract(port: &PortDto, direction: PortDirection, base_dir: &Path) -> Result<Option<Contract>> {
    let from_file = match &port.contract_file {
        Some(file) => Some(Contract::from_file(base_dir.join(file), direction)?),
        None => None,
    };
    let inline = port.contract.as_ref().map(Contract::from_dto).transpose()?;

    // Inline entries win over the ones of the document.
    Ok(match (from_file, inline) {
        (Some(mut contract), Some(inline)) => {
            for (field, spec) in inline.iter() {
                contract.add_entry(field, &spec.type_name, spec.periodicity)?;
            }
            Some(contract)
        }
        (contract, None) => contract,
        (None, inline) => inline,
    })
}

fn build_node(graph: &WorkflowGraph, dto: &NodeDto, base_dir: &Path) -> Result<Node> {
    let resources = resources(graph, &dto.name, &dto.topology, dto.start_proc, dto.nprocs)?
        .ok_or_else(|| Error::ModelConstructionError(format!("Node '{}' needs a 'topology' or 'nprocs'", dto.name)))?;
    let mut node = Node::new(&dto.name, resources, &dto.func, &dto.cmdline);

    for port in &dto.inports {
        match port_contract(port, PortDirection::In, base_dir)? {
            Some(contract) => node.add_inport_with_contract(&port.name, contract)?,
            None => node.add_inport(&port.name)?,
        }
        if port.tokens > 0 {
            node.set_tokens(&port.name, port.tokens)?;
        }
    }
    for port in &dto.outports {
        if port.tokens > 0 {
            return Err(Error::PortDirectionError { node: dto.name.clone(), port: port.name.clone(), expected: "input".to_string() });
        }
        match port_contract(port, PortDirection::Out, base_dir)? {
            Some(contract) => node.add_outport_with_contract(&port.name, contract)?,
            None => node.add_outport(&port.name)?,
        }
    }
    Ok(node)
}

fn build_edge(graph: &WorkflowGraph, dto: &EdgeDto, base_dir: &Path) -> Result<Edge> {
    let source: PortRef = dto.source.parse()?;
    let target: PortRef = dto.target.parse()?;
    let owner = format!("{}_{}", source.node, target.node);

    let resources = resources(graph, &owner, &dto.topology, dto.start_proc, dto.nprocs)?.unwrap_or_default();
    let mut edge = if resources.nprocs(graph.topologies())? > 0 {
        let link = LinkProcess::new(
            dto.func.as_deref().unwrap_or(DEFAULT_LINK_FUNC),
            dto.path.as_deref().unwrap_or_default(),
            dto.con_redist.as_deref().unwrap_or(&dto.prod_redist),
            dto.cmdline.as_deref().unwrap_or_default(),
        );
        Edge::routed(source, target, resources, &dto.prod_redist, link)
    } else {
        Edge::direct(source, target, &dto.prod_redist)
    };

    if let Some(contract_link) = &dto.contract_link {
        edge.set_contract_link(ContractLink::from_dto(contract_link, base_dir)?);
    }
    if let Some(transport) = &dto.transport {
        edge = edge.with_transport(transport.parse::<Transport>()?);
    }
    if let Some(stream) = &dto.stream {
        edge = edge.with_stream(StreamPolicy::from(stream));
    }
    Ok(edge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(json: &str) -> Result<WorkflowDefinition> {
        let dto: WorkflowDto = serde_json::from_str(json).unwrap();
        build_workflow(dto, Path::new("."))
    }

    #[test]
    fn test_build_from_split_topology() {
        let definition = build(
            r#"{
                "name": "wf",
                "filterLevel": "EVERYWHERE",
                "topologies": [
                    {"kind": "root", "name": "all", "nprocs": 8},
                    {"kind": "split", "parent": "all", "parts": [{"name": "prod", "nprocs": 4}, {"name": "link", "nprocs": 2}, {"name": "con", "nprocs": 2}]}
                ],
                "nodes": [
                    {"name": "prod", "func": "prod", "cmdline": "./prod", "topology": "prod", "outports": [{"name": "out", "contract": {"x": ["int"]}}]},
                    {"name": "con", "func": "con", "cmdline": "./con", "topology": "con", "inports": [{"name": "in", "tokens": 1}]}
                ],
                "edges": [
                    {"source": "prod.out", "target": "con.in", "topology": "link", "prodRedist": "count", "cmdline": "./dflow", "stream": {"preset": "directSync"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(definition.filter_level, Some(FilterLevel::Everywhere));
        let graph = definition.graph;
        let (_, edge) = graph.edges().next().unwrap();
        assert!(edge.is_routed());
        assert_eq!(edge.resources.rank_range(graph.topologies()).unwrap(), 4..6);
        assert_eq!(edge.stream.as_ref().unwrap().stream, "single");

        let con = graph.node(graph.node_key("con").unwrap()).unwrap();
        assert!(con.has_tokens());
    }

    #[test]
    fn test_unknown_topology() {
        let result = build(r#"{"name": "wf", "nodes": [{"name": "a", "func": "a", "cmdline": "./a", "topology": "nowhere"}]}"#);
        assert!(matches!(result, Err(Error::UnknownTopologyError(name)) if name == "nowhere"));
    }

    #[test]
    fn test_node_without_ranks() {
        let result = build(r#"{"name": "wf", "nodes": [{"name": "a", "func": "a", "cmdline": "./a"}]}"#);
        assert!(matches!(result, Err(Error::ModelConstructionError(_))));
    }

    #[test]
    fn test_tokens_on_output_port() {
        let result = build(r#"{"name": "wf", "nodes": [{"name": "a", "func": "a", "cmdline": "./a", "nprocs": 1, "outports": [{"name": "out", "tokens": 2}]}]}"#);
        assert!(matches!(result, Err(Error::PortDirectionError { .. })));
    }
}
