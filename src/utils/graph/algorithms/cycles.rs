//! Cycle detection restricted to a subset of nodes.

use std::collections::HashSet;

use crate::utils::graph::{NodeId, Successors};

/// Finds a cycle among `nodes`, following only edges between members of `nodes`.
///
/// The returned path starts and ends with the same node. Returns `None` if the induced
/// subgraph is acyclic.
pub fn find_cycle<G: Successors>(graph: &G, nodes: &[NodeId]) -> Option<Vec<NodeId>> {
    let members: HashSet<NodeId> = nodes.iter().copied().collect();
    let mut finished: HashSet<NodeId> = HashSet::new();

    for start in nodes {
        if finished.contains(start) {
            continue;
        }

        let mut path = vec![*start];
        let mut on_path: HashSet<NodeId> = HashSet::from([*start]);
        let mut stack = vec![graph
            .successors(*start)
            .into_iter()
            .filter(|n| members.contains(n))
            .collect::<Vec<_>>()];

        while let Some(frontier) = stack.last_mut() {
            match frontier.pop() {
                Some(next) if on_path.contains(&next) => {
                    let begin = path.iter().position(|n| *n == next).unwrap_or(0);
                    let mut cycle = path[begin..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Some(next) if finished.contains(&next) => {}
                Some(next) => {
                    path.push(next);
                    on_path.insert(next);
                    stack.push(
                        graph
                            .successors(next)
                            .into_iter()
                            .filter(|n| members.contains(n))
                            .collect(),
                    );
                }
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(&done);
                        finished.insert(done);
                    }
                }
            }
        }
    }
    None
}
