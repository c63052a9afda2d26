//! Small directed graph with typed node and edge identifiers.
//!
//! [`DirectedGraph`] stores node and edge payloads in insertion order and keeps adjacency
//! lists in both directions. It is used to order descriptor batches before code generation.
//!
//! # Examples
//!
//! ```rust,ignore
//! use typeforge::utils::graph::{algorithms, DirectedGraph};
//!
//! let mut graph: DirectedGraph<&str, bool> = DirectedGraph::new();
//! let a = graph.add_node("A");
//! let b = graph.add_node("B");
//! graph.add_edge(a, b, true);
//!
//! let order = algorithms::topological_sort(&graph, |hard| *hard).unwrap();
//! assert_eq!(order, vec![a, b]);
//! ```

pub mod algorithms;
mod edge;
mod node;

pub use edge::EdgeId;
pub use node::NodeId;

/// Minimal view of a graph exposing node count and forward adjacency
pub trait Successors {
    /// Number of nodes
    fn node_count(&self) -> usize;
    /// Nodes reachable through one outgoing edge of `node`
    fn successors(&self, node: NodeId) -> Vec<NodeId>;
}

/// Backward adjacency
pub trait Predecessors {
    /// Nodes with an edge into `node`
    fn predecessors(&self, node: NodeId) -> Vec<NodeId>;
}

#[derive(Debug, Clone)]
struct Edge<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node payloads `N` and edge payloads `E`
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<Edge<E>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates an empty graph with pre-allocated node capacity
    #[must_use]
    pub fn with_capacity(nodes: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(nodes),
            edges: Vec::new(),
            outgoing: Vec::with_capacity(nodes),
            incoming: Vec::with_capacity(nodes),
        }
    }

    /// Adds a node and returns its id
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// Returns `None` if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Option<EdgeId> {
        if source.index() >= self.nodes.len() || target.index() >= self.nodes.len() {
            return None;
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(Edge {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        Some(id)
    }

    /// Node payload
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.index())
    }

    /// Edge payload
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(id.index()).map(|edge| &edge.data)
    }

    /// Source and target of an edge
    #[must_use]
    pub fn edge_endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges
            .get(id.index())
            .map(|edge| (edge.source, edge.target))
    }

    /// Outgoing edges of `node` in insertion order
    #[must_use]
    pub fn outgoing_edges(&self, node: NodeId) -> &[EdgeId] {
        self.outgoing.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Incoming edges of `node` in insertion order
    #[must_use]
    pub fn incoming_edges(&self, node: NodeId) -> &[EdgeId] {
        self.incoming.get(node.index()).map_or(&[], Vec::as_slice)
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All node ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn successors(&self, node: NodeId) -> Vec<NodeId> {
        self.outgoing_edges(node)
            .iter()
            .map(|edge| self.edges[edge.index()].target)
            .collect()
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.incoming_edges(node)
            .iter()
            .map(|edge| self.edges[edge.index()].source)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_adjacency() {
        let mut graph: DirectedGraph<char, u8> = DirectedGraph::new();
        let a = graph.add_node('A');
        let b = graph.add_node('B');
        let c = graph.add_node('C');
        let ab = graph.add_edge(a, b, 1).unwrap();
        graph.add_edge(a, c, 2).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.successors(a), vec![b, c]);
        assert_eq!(graph.predecessors(c), vec![a]);
        assert_eq!(graph.edge(ab), Some(&1));
        assert_eq!(graph.edge_endpoints(ab), Some((a, b)));
        assert_eq!(graph.node(b), Some(&'B'));
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(graph.add_edge(a, NodeId::new(5), ()).is_none());
        assert_eq!(graph.edge_count(), 0);
    }
}
