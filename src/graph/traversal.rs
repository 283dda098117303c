use std::collections::{HashMap, VecDeque};

use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;

use super::builder::FlowGraph;
use super::types::Node;
use crate::error::{FlowError, FlowResult};

/// Kahn's algorithm over the backing digraph, with deterministic tie
/// breaking.
///
/// Zero-in-degree nodes are seeded in declaration order, and nodes
/// whose last dependency just finished are enqueued in declaration
/// order, so the same graph always yields the same order. Disconnected
/// nodes all count as roots and run in declaration order.
fn kahn_order(graph: &FlowGraph) -> FlowResult<Vec<String>> {
    let digraph = graph.digraph();

    let mut position: HashMap<NodeIndex, usize> = HashMap::with_capacity(graph.node_count());
    let mut indices = Vec::with_capacity(graph.node_count());
    for (pos, id) in graph.node_order().iter().enumerate() {
        if let Some(idx) = graph.index_of(id) {
            position.insert(idx, pos);
            indices.push(idx);
        }
    }

    // Parallel edges each count toward the in-degree; relaxation below
    // visits the neighbor once per edge, so the counts line up.
    let mut in_degree: HashMap<NodeIndex, usize> = indices
        .iter()
        .map(|&idx| {
            (
                idx,
                digraph.edges_directed(idx, Direction::Incoming).count(),
            )
        })
        .collect();

    let mut queue: VecDeque<NodeIndex> = indices
        .iter()
        .copied()
        .filter(|idx| in_degree.get(idx).copied().unwrap_or(0) == 0)
        .collect();

    let mut ordered = Vec::with_capacity(indices.len());
    while let Some(idx) = queue.pop_front() {
        if let Some(node) = digraph.node_weight(idx) {
            ordered.push(node.id.clone());
        }
        let mut released = Vec::new();
        for next in digraph.neighbors_directed(idx, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    released.push(next);
                }
            }
        }
        released.sort_by_key(|n| position.get(n).copied().unwrap_or(usize::MAX));
        queue.extend(released);
    }

    if ordered.len() != graph.node_count() {
        return Err(FlowError::CycleDetected);
    }
    Ok(ordered)
}

impl FlowGraph {
    /// Topological execution order. Fails with
    /// [`FlowError::CycleDetected`] before any node runs when no total
    /// order exists.
    pub fn execution_order(&self) -> FlowResult<Vec<&Node>> {
        let ids = kahn_order(self)?;
        Ok(ids.iter().filter_map(|id| self.node(id)).collect())
    }

    /// Single cycle-detection primitive, shared by the scheduler and by
    /// export-time validation.
    pub fn has_cycle(&self) -> bool {
        kahn_order(self).is_err()
    }

    /// Pre-export validation: currently a cycle check over the same
    /// primitive the scheduler uses.
    pub fn validate(&self) -> FlowResult<()> {
        kahn_order(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::{Edge, NodeType};

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, NodeType::Code)).collect()
    }

    #[test]
    fn order_respects_every_edge() {
        let graph = FlowGraph::build(
            nodes(&["d", "b", "a", "c"]),
            vec![
                Edge::new("e1", "a", "b"),
                Edge::new("e2", "b", "c"),
                Edge::new("e3", "a", "d"),
            ],
        );
        let order: Vec<&str> = graph
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order.len(), 4);
        let pos = |id: &str| order.iter().position(|n| *n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert!(pos("a") < pos("d"));
    }

    #[test]
    fn disconnected_nodes_run_in_declaration_order() {
        let graph = FlowGraph::build(nodes(&["z", "m", "a"]), vec![]);
        let order: Vec<&str> = graph
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["z", "m", "a"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let graph = FlowGraph::build(
            nodes(&["a", "b", "c"]),
            vec![
                Edge::new("e1", "a", "b"),
                Edge::new("e2", "b", "c"),
                Edge::new("e3", "c", "a"),
            ],
        );
        assert!(matches!(
            graph.execution_order(),
            Err(FlowError::CycleDetected)
        ));
        assert!(graph.has_cycle());
        assert!(graph.validate().is_err());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = FlowGraph::build(nodes(&["a"]), vec![Edge::new("e1", "a", "a")]);
        assert!(graph.has_cycle());
    }

    #[test]
    fn parallel_edges_do_not_wedge_the_order() {
        let graph = FlowGraph::build(
            nodes(&["a", "b"]),
            vec![Edge::new("e1", "a", "b"), Edge::new("e2", "a", "b")],
        );
        let order: Vec<&str> = graph
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn simultaneously_released_nodes_follow_declaration_order() {
        // Both "late" and "early" become runnable the moment "root"
        // finishes; declaration order decides who goes first.
        let graph = FlowGraph::build(
            nodes(&["root", "late", "early"]),
            vec![Edge::new("e1", "root", "late"), Edge::new("e2", "root", "early")],
        );
        let order: Vec<&str> = graph
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["root", "late", "early"]);
    }

    #[test]
    fn order_is_stable_across_runs() {
        let build = || {
            FlowGraph::build(
                nodes(&["r2", "r1", "mid", "sink"]),
                vec![
                    Edge::new("e1", "r1", "mid"),
                    Edge::new("e2", "r2", "mid"),
                    Edge::new("e3", "mid", "sink"),
                ],
            )
        };
        let first: Vec<String> = build()
            .execution_order()
            .unwrap()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        for _ in 0..5 {
            let again: Vec<String> = build()
                .execution_order()
                .unwrap()
                .iter()
                .map(|n| n.id.clone())
                .collect();
            assert_eq!(first, again);
        }
    }
}
