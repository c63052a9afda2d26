//! Synchronization primitives for concurrent type generation.
//!
//! Code generation backends may only be driven from one logical section at a time. This
//! module provides the two primitives the pipeline builds on to make concurrent requests
//! safe while keeping cache hits lock-free.
//!
//! # Key Components
//!
//! - [`CodeGenerationLock`] - Re-entrant critical section serializing all code generation
//! - [`ModuleContextPool`] - Bounded pool of module contexts with thread-affine leases
//!
//! # Design Principles
//!
//! - **Single Writer**: Every batch is generated inside the critical section
//! - **Re-entrancy**: A participant may request further types from inside its own request
//! - **Affinity**: A leased context is returned by the thread that took it, or not at all

mod lock;
mod pool;

pub use lock::{CodeGenerationGuard, CodeGenerationLock};
pub use pool::{CodeGeneratorFactory, ModuleContext, ModuleContextLease, ModuleContextPool};
