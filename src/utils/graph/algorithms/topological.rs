//! Deterministic topological ordering with soft edges.
//!
//! Edges are classified by a caller supplied predicate as *hard* (the target must never come
//! before the source) or *soft* (preferably respected, but allowed to be broken to resolve a
//! cycle). Among all nodes whose incoming edges are satisfied, the one inserted first is
//! emitted next, which makes the result independent of hash ordering.
//!
//! When no node is ready, the earliest inserted remaining node whose *hard* incoming edges are
//! all satisfied is released, ignoring its pending soft edges. If no such node exists the
//! remaining nodes form a cycle of hard edges and sorting fails.

use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap},
};

use crate::utils::graph::{DirectedGraph, NodeId};

/// Remaining nodes when only cycles of hard edges are left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Nodes that could not be ordered, in insertion order
    pub remaining: Vec<NodeId>,
}

/// Orders all nodes of `graph` so that every edge points forward where possible.
///
/// # Arguments
///
/// * `graph` - The graph to sort
/// * `is_hard` - Returns true for edges that must never be broken
///
/// # Errors
///
/// Returns [`CycleError`] with the unordered nodes if they are connected by a cycle of hard
/// edges.
pub fn topological_sort<N, E, F>(
    graph: &DirectedGraph<N, E>,
    is_hard: F,
) -> Result<Vec<NodeId>, CycleError>
where
    F: Fn(&E) -> bool,
{
    let count = graph.node_ids().count();
    let mut pending_all = vec![0usize; count];
    let mut pending_hard = vec![0usize; count];

    for node in graph.node_ids() {
        for edge in graph.incoming_edges(node) {
            if let (Some(data), Some((source, _))) = (graph.edge(*edge), graph.edge_endpoints(*edge)) {
                if source == node {
                    continue;
                }
                pending_all[node.index()] += 1;
                if is_hard(data) {
                    pending_hard[node.index()] += 1;
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = graph
        .node_ids()
        .filter(|node| pending_all[node.index()] == 0)
        .map(Reverse)
        .collect();
    let mut remaining: BTreeSet<NodeId> = graph.node_ids().collect();
    let mut order = Vec::with_capacity(count);

    while !remaining.is_empty() {
        let next = match ready.pop() {
            Some(Reverse(node)) => node,
            None => {
                let released = remaining
                    .iter()
                    .copied()
                    .find(|node| pending_hard[node.index()] == 0);
                match released {
                    Some(node) => node,
                    None => {
                        return Err(CycleError {
                            remaining: remaining.into_iter().collect(),
                        })
                    }
                }
            }
        };

        if !remaining.remove(&next) {
            continue;
        }
        order.push(next);

        for edge in graph.outgoing_edges(next) {
            let (Some(data), Some((_, target))) = (graph.edge(*edge), graph.edge_endpoints(*edge))
            else {
                continue;
            };
            if target == next || !remaining.contains(&target) {
                continue;
            }

            let all = &mut pending_all[target.index()];
            *all = all.saturating_sub(1);
            if is_hard(data) {
                let hard = &mut pending_hard[target.index()];
                *hard = hard.saturating_sub(1);
            }
            if pending_all[target.index()] == 0 {
                ready.push(Reverse(target));
            }
        }
    }

    Ok(order)
}
