//! Graph helpers shared by the package graph and the task graph.
//!
//! Edges point from an upstream node to the nodes that depend on it, so a
//! node is ready once all of its incoming edges are satisfied.

use std::collections::{BinaryHeap, HashMap, HashSet};

use itertools::Itertools;
use petgraph::{
    graph::{Graph, NodeIndex},
    visit::{Bfs, EdgeRef},
    Direction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "tasks depend on each other in a loop, so there is no valid order to run them in:\n{cycles}"
    )]
    Cycle { cycles: String },
    #[error("task {node} lists itself among its own dependencies")]
    SelfEdge { node: String },
}

/// Rejects graphs the scheduler cannot walk: dependency cycles and
/// self-edges. The error message lists every offending cycle's node weights.
pub fn validate_graph<N: std::fmt::Display + Ord>(graph: &Graph<N, ()>) -> Result<(), Error> {
    for edge in graph.edge_references() {
        if edge.source() == edge.target() {
            let node = graph
                .node_weight(edge.source())
                .expect("edge endpoints exist in graph");
            return Err(Error::SelfEdge {
                node: node.to_string(),
            });
        }
    }

    let mut cycles = petgraph::algo::tarjan_scc(graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            component
                .into_iter()
                .map(|index| {
                    graph
                        .node_weight(index)
                        .expect("scc nodes exist in graph")
                })
                .sorted()
                .map(|weight| weight.to_string())
                .join(" <-> ")
        })
        .collect::<Vec<_>>();
    cycles.sort();

    if cycles.is_empty() {
        Ok(())
    } else {
        Err(Error::Cycle {
            cycles: cycles
                .into_iter()
                .map(|cycle| format!("  {cycle}"))
                .join("\n"),
        })
    }
}

/// Deterministic Kahn topological sort: among ready nodes, the smallest
/// weight is emitted first, so repeated sorts of the same graph agree.
///
/// Call [`validate_graph`] first; a cyclic graph yields the same error here.
pub fn topo_sort<N: Ord + Clone + std::fmt::Display>(
    graph: &Graph<N, ()>,
) -> Result<Vec<NodeIndex>, Error> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|index| {
            (
                index,
                graph.neighbors_directed(index, Direction::Incoming).count(),
            )
        })
        .collect();

    // min-heap keyed on node weight
    let mut ready: BinaryHeap<std::cmp::Reverse<(N, NodeIndex)>> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&index, _)| {
            std::cmp::Reverse((
                graph.node_weight(index).expect("node exists").clone(),
                index,
            ))
        })
        .collect();

    let mut sorted = Vec::with_capacity(graph.node_count());
    while let Some(std::cmp::Reverse((_, index))) = ready.pop() {
        sorted.push(index);
        for downstream in graph.neighbors_directed(index, Direction::Outgoing) {
            let degree = in_degree
                .get_mut(&downstream)
                .expect("all nodes have a recorded in-degree");
            *degree -= 1;
            if *degree == 0 {
                ready.push(std::cmp::Reverse((
                    graph.node_weight(downstream).expect("node exists").clone(),
                    downstream,
                )));
            }
        }
    }

    if sorted.len() != graph.node_count() {
        // the unemitted remainder contains the cycle
        validate_graph(graph)?;
        unreachable!("nodes left unsorted in an acyclic graph");
    }
    Ok(sorted)
}

/// Every node reachable by following edges out of `start`, excluding `start`
/// itself. Used to skip the transitive dependents of a failed task.
pub fn transitive_dependents<N>(graph: &Graph<N, ()>, start: NodeIndex) -> HashSet<NodeIndex> {
    let mut dependents = HashSet::new();
    let mut bfs = Bfs::new(graph, start);
    while let Some(index) = bfs.next(graph) {
        if index != start {
            dependents.insert(index);
        }
    }
    dependents
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn diamond() -> (Graph<&'static str, ()>, [NodeIndex; 4]) {
        // utils -> core -> app, utils -> app, lint independent
        let mut graph = Graph::new();
        let utils = graph.add_node("build::packages/utils");
        let core = graph.add_node("build::packages/core");
        let app = graph.add_node("build::packages/app");
        let lint = graph.add_node("lint::packages/core");
        graph.add_edge(utils, core, ());
        graph.add_edge(core, app, ());
        graph.add_edge(utils, app, ());
        (graph, [utils, core, app, lint])
    }

    #[test]
    fn test_topo_sort_is_deterministic_and_ordered() {
        let (graph, [utils, core, app, lint]) = diamond();
        let sorted = topo_sort(&graph).unwrap();
        // every "build::*" key sorts before "lint::*", so lint goes last even
        // though it was ready from the start
        assert_eq!(sorted, vec![utils, core, app, lint]);
        assert_eq!(topo_sort(&graph).unwrap(), sorted);
    }

    #[test]
    fn test_cycle_is_fatal_with_members_listed() {
        let mut graph = Graph::new();
        let a = graph.add_node("build::a");
        let b = graph.add_node("build::b");
        graph.add_edge(a, b, ());
        graph.add_edge(b, a, ());
        let err = topo_sort(&graph).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("build::a"));
        assert!(message.contains("build::b"));
    }

    #[test]
    fn test_self_edge() {
        let mut graph = Graph::new();
        let a = graph.add_node("build::a");
        graph.add_edge(a, a, ());
        assert!(matches!(validate_graph(&graph), Err(Error::SelfEdge { .. })));
    }

    #[test]
    fn test_transitive_dependents() {
        let (graph, [utils, core, app, lint]) = diamond();
        let dependents = transitive_dependents(&graph, utils);
        assert!(dependents.contains(&core));
        assert!(dependents.contains(&app));
        assert!(!dependents.contains(&lint));
        assert!(!dependents.contains(&utils));
    }
}
