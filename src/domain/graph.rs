use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use slotmap::SlotMap;

use crate::domain::edge::{Edge, EdgeKey, LinkPolicy};
use crate::domain::node::{Node, NodeKey, Port, PortDirection};
use crate::domain::resources::ResourceAssignment;
use crate::domain::topology::{TopologyKey, TopologyStore};
use crate::domain::utils::id::NodeName;
use crate::error::{Error, Result};

/// Builder holding every topology, task and edge of one workflow.
///
/// Nodes and edges keep their declaration order, which drives descriptor indices.
#[derive(Debug, Default)]
pub struct WorkflowGraph {
    topologies: TopologyStore,

    nodes: SlotMap<NodeKey, Node>,
    node_order: Vec<NodeKey>,
    name_index: HashMap<NodeName, NodeKey>,

    edges: SlotMap<EdgeKey, Edge>,
    edge_order: Vec<EdgeKey>,

    /// Non-fatal conditions found while building.
    warnings: Vec<String>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from already declared topologies.
    pub fn with_topologies(topologies: TopologyStore) -> Self {
        Self { topologies, ..Self::default() }
    }

    pub fn topologies(&self) -> &TopologyStore {
        &self.topologies
    }

    pub fn topologies_mut(&mut self) -> &mut TopologyStore {
        &mut self.topologies
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    fn check_resources(&self, resources: &ResourceAssignment) -> Result<()> {
        if let ResourceAssignment::Topology(key) = resources {
            if self.topologies.get(*key).is_none() {
                return Err(Error::UnknownTopologyError(format!("{:?}", key)));
            }
        }
        Ok(())
    }

    pub fn add_node(&mut self, node: Node) -> Result<NodeKey> {
        if self.name_index.contains_key(&node.name) {
            return Err(Error::DuplicateNameError(node.name.id));
        }
        self.check_resources(&node.resources)?;

        let name = node.name.clone();
        let key = self.nodes.insert(node);
        self.name_index.insert(name, key);
        self.node_order.push(key);
        Ok(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn node_key(&self, name: &str) -> Option<NodeKey> {
        self.name_index.get(&NodeName::new(name)).copied()
    }

    fn node_by_name(&self, name: &NodeName) -> Result<(NodeKey, &Node)> {
        let key = self.name_index.get(name).copied().ok_or_else(|| Error::UnknownNodeError(name.id.clone()))?;
        let node = self.nodes.get(key).ok_or_else(|| Error::UnknownNodeError(name.id.clone()))?;
        Ok((key, node))
    }

    /// Position of the node in declaration order.
    pub fn node_index(&self, name: &NodeName) -> Option<usize> {
        let key = self.name_index.get(name)?;
        self.node_order.iter().position(|candidate| candidate == key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.node_order.iter().filter_map(|key| self.nodes.get(*key).map(|node| (*key, node)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Connects an output port to an input port.
    ///
    /// The graph is left untouched when the edge is rejected.
    pub fn add_edge(&mut self, mut edge: Edge) -> Result<EdgeKey> {
        let name = edge.name();
        let (source_key, source) = self.node_by_name(&edge.source.node)?;
        source.check_port(&edge.source.port, PortDirection::Out)?;
        let (target_key, target) = self.node_by_name(&edge.target.node)?;
        if let Some(port) = target.check_port(&edge.target.port, PortDirection::In)? {
            if port.is_connected() {
                return Err(Error::InputPortFanInError { node: edge.target.node.id.clone(), port: edge.target.port.clone() });
            }
        }
        self.check_resources(&edge.resources)?;

        let nprocs = edge.resources.nprocs(&self.topologies)?;
        // (has a link contract, has a command line) of a routed edge
        let routed = match &edge.link {
            LinkPolicy::Routed(process) => Some((process.contract.is_some(), !process.cmdline.trim().is_empty())),
            LinkPolicy::Direct => None,
        };
        match routed {
            Some((has_contract, _)) if nprocs == 0 => {
                if has_contract {
                    self.warn(format!("Edge '{}' has no link ranks, its link contract is ignored", name));
                } else {
                    self.warn(format!("Edge '{}' has no link ranks and is treated as a direct edge", name));
                }
                edge.link = LinkPolicy::Direct;
            }
            Some((_, false)) => {
                return Err(Error::MissingLinkCommandError { edge: name });
            }
            None if nprocs > 0 => {
                self.warn(format!("Direct edge '{}' holds {} ranks that no link process uses, they are released", name, nprocs));
                edge.resources = ResourceAssignment::default();
            }
            _ => {}
        }

        let source_port = edge.source.port.clone();
        let target_port = edge.target.port.clone();
        let key = self.edges.insert(edge);
        self.edge_order.push(key);

        // Both ports were checked above, resolving them can only create missing implicit ports.
        if let Some(node) = self.nodes.get_mut(source_key) {
            node.resolve_port(&source_port, PortDirection::Out)?.edges.push(key);
        }
        if let Some(node) = self.nodes.get_mut(target_key) {
            node.resolve_port(&target_port, PortDirection::In)?.edges.push(key);
        }

        log::debug!("Connected edge '{}' with {} link ranks", name, nprocs);
        Ok(key)
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, &Edge)> {
        self.edge_order.iter().filter_map(|key| self.edges.get(*key).map(|edge| (*key, edge)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Output port feeding the edge.
    pub fn source_port(&self, edge: &Edge) -> Result<&Port> {
        let (_, node) = self.node_by_name(&edge.source.node)?;
        node.port(&edge.source.port, PortDirection::Out)
            .ok_or_else(|| Error::UnknownPortError { node: edge.source.node.id.clone(), port: edge.source.port.clone() })
    }

    /// Input port fed by the edge.
    pub fn target_port(&self, edge: &Edge) -> Result<&Port> {
        let (_, node) = self.node_by_name(&edge.target.node)?;
        node.port(&edge.target.port, PortDirection::In)
            .ok_or_else(|| Error::UnknownPortError { node: edge.target.node.id.clone(), port: edge.target.port.clone() })
    }

    /// Topologies backing a task or a routed edge.
    pub fn entity_topologies(&self) -> Vec<TopologyKey> {
        let nodes = self.nodes().filter_map(|(_, node)| node.resources.topology_key());
        let edges = self.edges().filter(|(_, edge)| edge.is_routed()).filter_map(|(_, edge)| edge.resources.topology_key());
        nodes.chain(edges).collect()
    }

    /// Re-ranks the topologies used by the graph if a host subset broke contiguity.
    pub fn finalize_ranking(&mut self) -> bool {
        let keys = self.entity_topologies();
        self.topologies.finalize_ranking(&keys)
    }

    /// Node-level dependency graph. Node `i` of the result is the `i`-th declared node,
    /// parallel edges between two nodes are merged.
    pub fn dependency_graph(&self) -> DiGraph<NodeKey, ()> {
        let mut dependencies = DiGraph::with_capacity(self.node_order.len(), self.edge_order.len());
        for key in &self.node_order {
            dependencies.add_node(*key);
        }
        for (_, edge) in self.edges() {
            if let (Some(source), Some(target)) = (self.node_index(&edge.source.node), self.node_index(&edge.target.node)) {
                dependencies.update_edge(NodeIndex::new(source), NodeIndex::new(target), ());
            }
        }
        dependencies
    }
}
