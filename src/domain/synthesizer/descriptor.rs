use crate::api::descriptor_dto::{DescriptorDto, EdgeDescriptorDto, NodeDescriptorDto, WorkflowDescriptorDto};
use crate::domain::compiler::FilterLevel;
use crate::domain::edge::{Edge, LinkPolicy};
use crate::domain::graph::WorkflowGraph;
use crate::domain::node::{Node, Port};
use crate::domain::resolver::{ContractResolution, EdgeResolution};
use crate::error::{Error, Result};

fn port_names(ports: &[Port]) -> Option<Vec<String>> {
    if ports.is_empty() { None } else { Some(ports.iter().map(|port| port.name.clone()).collect()) }
}

fn node_descriptor(graph: &WorkflowGraph, node: &Node) -> Result<NodeDescriptorDto> {
    let ranks = node.resources.rank_range(graph.topologies())?;
    Ok(NodeDescriptorDto {
        start_proc: ranks.start,
        nprocs: ranks.len(),
        func: node.func.clone(),
        cmdline: node.cmdline.clone(),
        inports: port_names(node.input_ports()),
        outports: port_names(node.output_ports()),
    })
}

fn edge_descriptor(graph: &WorkflowGraph, edge: &Edge, resolution: Option<&EdgeResolution>) -> Result<EdgeDescriptorDto> {
    let ranks = edge.resources.rank_range(graph.topologies())?;
    let source = graph.node_index(&edge.source.node).ok_or_else(|| Error::UnknownNodeError(edge.source.node.id.clone()))?;
    let target = graph.node_index(&edge.target.node).ok_or_else(|| Error::UnknownNodeError(edge.target.node.id.clone()))?;
    let tokens = graph.target_port(edge)?.tokens;

    let mut descriptor = EdgeDescriptorDto {
        start_proc: ranks.start,
        nprocs: ranks.len(),
        source,
        target,
        name: edge.name(),
        prod_redist: edge.prod_redist.clone(),
        con_redist: None,
        func: None,
        path: None,
        source_port: edge.source.port.clone(),
        target_port: edge.target.port.clone(),
        tokens,
        transport: edge.transport.runtime_name().to_string(),
        keys: resolution.and_then(|resolution| resolution.keys.as_ref()).map(|keys| keys.to_dto()),
        keys_link: None,
        accept_any: None,
        forward_unlisted: None,
        stream: None,
        frame_policy: None,
        storage_types: None,
        storage_collection_policy: None,
        max_storage_sizes: None,
        prod_output_freq: None,
        low_output_freq: None,
        high_output_freq: None,
    };

    if let LinkPolicy::Routed(process) = &edge.link {
        descriptor.con_redist = Some(process.con_redist.clone());
        descriptor.func = Some(process.func.clone());
        descriptor.path = Some(process.path.clone());

        if let Some(resolution) = resolution {
            descriptor.keys_link = resolution.keys_link.as_ref().map(|keys| keys.to_dto());
            descriptor.accept_any = resolution.accept_any;
            descriptor.forward_unlisted = resolution.forward_unlisted.then_some(true);
        }
    }

    if let Some(stream) = &edge.stream {
        descriptor.stream = Some(stream.stream.clone());
        descriptor.frame_policy = Some(stream.frame_policy.clone());
        descriptor.storage_types = Some(stream.storage_types.clone());
        descriptor.storage_collection_policy = Some(stream.storage_collection_policy.clone());
        descriptor.max_storage_sizes = Some(stream.max_storage_sizes.clone());
        descriptor.prod_output_freq = stream.prod_output_freq;
        descriptor.low_output_freq = stream.low_output_freq;
        descriptor.high_output_freq = stream.high_output_freq;
    }

    Ok(descriptor)
}

/// Workflow document for the runtime: nodes and edges in declaration order, edges pointing at node indices.
pub fn to_descriptor(graph: &WorkflowGraph, resolution: Option<&ContractResolution>, filter_level: FilterLevel) -> Result<DescriptorDto> {
    let nodes = graph.nodes().map(|(_, node)| node_descriptor(graph, node)).collect::<Result<Vec<_>>>()?;
    let edges = graph
        .edges()
        .map(|(key, edge)| edge_descriptor(graph, edge, resolution.and_then(|resolution| resolution.get(key))))
        .collect::<Result<Vec<_>>>()?;

    log::info!("Described {} nodes and {} edges", nodes.len(), edges.len());
    Ok(DescriptorDto { workflow: WorkflowDescriptorDto { filter_level: filter_level.as_str().to_string(), nodes, edges } })
}
