//! Graph algorithms used for ordering descriptor batches.
//!
//! # Available Algorithms
//!
//! - [`topological_sort`] - Deterministic Kahn ordering that tolerates cycles through soft edges
//! - [`find_cycle`] - Find a cycle among a subset of nodes, for diagnostics
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Topological Sort | O((V + E) log V) | Declaration ordering |
//! | Cycle search | O(V + E) | Error reporting |

mod cycles;
mod topological;

pub use cycles::find_cycle;
pub use topological::{topological_sort, CycleError};
