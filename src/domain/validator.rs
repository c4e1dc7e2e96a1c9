use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::domain::graph::WorkflowGraph;
use crate::error::{Error, Result};

/// Every simple directed cycle, as node indices.
///
/// Each cycle is reported once, starting from its smallest index. The search stays inside
/// one strongly connected component at a time.
pub fn simple_cycles<N, E>(graph: &DiGraph<N, E>) -> Vec<Vec<usize>> {
    if !is_cyclic_directed(graph) {
        return Vec::new();
    }

    let mut component = vec![0; graph.node_count()];
    for (id, members) in tarjan_scc(graph).iter().enumerate() {
        for member in members {
            component[member.index()] = id;
        }
    }

    let mut search = CycleSearch { graph, component, path: Vec::new(), on_path: vec![false; graph.node_count()], cycles: Vec::new() };
    for start in graph.node_indices() {
        search.path.push(start.index());
        search.on_path[start.index()] = true;
        search.extend(start, start);
        search.on_path[start.index()] = false;
        search.path.pop();
    }
    search.cycles
}

struct CycleSearch<'g, N, E> {
    graph: &'g DiGraph<N, E>,
    component: Vec<usize>,
    path: Vec<usize>,
    on_path: Vec<bool>,
    cycles: Vec<Vec<usize>>,
}

impl<N, E> CycleSearch<'_, N, E> {
    fn extend(&mut self, start: NodeIndex, current: NodeIndex) {
        let mut successors: Vec<NodeIndex> = self.graph.neighbors(current).collect();
        successors.sort();
        successors.dedup();

        for next in successors {
            if next == start {
                self.cycles.push(self.path.clone());
            } else if next > start && !self.on_path[next.index()] && self.component[next.index()] == self.component[start.index()] {
                self.path.push(next.index());
                self.on_path[next.index()] = true;
                self.extend(start, next);
                self.on_path[next.index()] = false;
                self.path.pop();
            }
        }
    }
}

/// Rejects every cycle in which no node has a token on an input port.
///
/// Without a pre-seeded message each node of such a cycle waits on its predecessor forever.
pub fn check_cycles(graph: &WorkflowGraph) -> Result<usize> {
    let nodes: Vec<_> = graph.nodes().map(|(_, node)| node).collect();
    let cycles = simple_cycles(&graph.dependency_graph());

    for cycle in &cycles {
        let names: Vec<&str> = cycle.iter().map(|&index| nodes[index].name.as_str()).collect();
        if !cycle.iter().any(|&index| nodes[index].has_tokens()) {
            let mut path = names.clone();
            path.push(names[0]);
            return Err(Error::UnresolvableCycleError { cycle: path.join(" -> ") });
        }
        log::debug!("Cycle {} is started by a token", names.join(" -> "));
    }

    log::info!("Validated {} cycles over {} nodes", cycles.len(), nodes.len());
    Ok(cycles.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digraph(node_count: usize, edges: &[(u32, u32)]) -> DiGraph<(), ()> {
        let mut graph = DiGraph::new();
        for _ in 0..node_count {
            graph.add_node(());
        }
        graph.extend_with_edges(edges);
        graph
    }

    #[test]
    fn test_no_cycles_in_dag() {
        assert!(simple_cycles(&digraph(3, &[(0, 1), (0, 2), (1, 2)])).is_empty());
    }

    #[test]
    fn test_two_node_cycle() {
        assert_eq!(simple_cycles(&digraph(2, &[(0, 1), (1, 0)])), vec![vec![0, 1]]);
    }

    #[test]
    fn test_self_loop() {
        assert_eq!(simple_cycles(&digraph(1, &[(0, 0)])), vec![vec![0]]);
    }

    #[test]
    fn test_overlapping_cycles_are_all_found() {
        // 0 -> 1 -> 0 and 0 -> 1 -> 2 -> 0
        let cycles = simple_cycles(&digraph(3, &[(0, 1), (1, 0), (1, 2), (2, 0)]));
        assert_eq!(cycles.len(), 2);
        assert!(cycles.contains(&vec![0, 1]));
        assert!(cycles.contains(&vec![0, 1, 2]));
    }

    #[test]
    fn test_disjoint_cycles() {
        let cycles = simple_cycles(&digraph(4, &[(0, 1), (1, 0), (2, 3), (3, 2)]));
        assert_eq!(cycles, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_edge_between_components_is_not_a_cycle() {
        // 0 <-> 1 feeds 2 <-> 3, the bridge 1 -> 2 closes no cycle
        let cycles = simple_cycles(&digraph(4, &[(0, 1), (1, 0), (1, 2), (2, 3), (3, 2)]));
        assert_eq!(cycles, vec![vec![0, 1], vec![2, 3]]);
    }
}
