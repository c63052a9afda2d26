//! Shared fixtures for unit tests.
//!
//! Tests across the crate build the same small class hierarchies over and over; the
//! factories here keep them identical so expectations stay comparable between modules.

pub mod fixtures;
pub mod participants;
