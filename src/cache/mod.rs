//! Caches of generated types and constructor delegates.
//!
//! Both caches are explicit instances owned by a [`crate::Pipeline`]. Lookups are lock-free;
//! only misses enter the code generation section of [`crate::sync`].

mod constructors;
mod types;

pub use constructors::{ConstructorCallCache, ConstructorDelegate};
pub use types::TypeCache;
