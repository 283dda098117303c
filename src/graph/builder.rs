use std::collections::HashMap;

use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use super::types::{Edge, Node};

/// A validated flow graph: dangling edges removed, nodes and edges
/// mirrored into a petgraph digraph that the scheduler traverses. The
/// flat edge list is kept alongside it for declaration-order listings.
///
/// Node and edge declaration order is retained; it is what makes tie
/// breaking in the scheduler and numbered notes inputs deterministic.
pub struct FlowGraph {
    graph: StableDiGraph<Node, ()>,
    node_order: Vec<String>,
    index_map: HashMap<String, NodeIndex>,
    edges: Vec<Edge>,
}

impl FlowGraph {
    /// Build a graph from raw node/edge lists.
    ///
    /// Edges whose `source` or `target` does not reference an existing
    /// node id are dropped up front (and logged), never silently kept.
    pub fn build(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut graph = StableDiGraph::new();
        let mut node_order = Vec::with_capacity(nodes.len());
        let mut index_map = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let id = node.id.clone();
            let idx = graph.add_node(node);
            node_order.push(id.clone());
            index_map.insert(id, idx);
        }

        let mut kept = Vec::with_capacity(edges.len());
        for edge in edges {
            match (index_map.get(&edge.source), index_map.get(&edge.target)) {
                (Some(&s), Some(&t)) => {
                    graph.add_edge(s, t, ());
                    kept.push(edge);
                }
                _ => {
                    tracing::warn!(
                        edge_id = %edge.id,
                        source = %edge.source,
                        target = %edge.target,
                        "dropping dangling edge"
                    );
                }
            }
        }

        FlowGraph {
            graph,
            node_order,
            index_map,
            edges: kept,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_map
            .get(id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.node(id))
    }

    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    /// Surviving edges, in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Source node ids of the edges pointing at `target`, in edge
    /// declaration order. Feeds the numbered `{{1}}, {{2}}, …` inputs
    /// of notes nodes.
    pub fn incoming_sources(&self, target: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == target)
            .map(|e| e.source.as_str())
            .collect()
    }

    pub(crate) fn node_order(&self) -> &[String] {
        &self.node_order
    }

    pub(crate) fn digraph(&self) -> &StableDiGraph<Node, ()> {
        &self.graph
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index_map.get(id).copied()
    }
}
