//! Stable handles into a [`crate::model::TypeArena`].
//!
//! Handles are plain `Copy` values; they stay valid for the lifetime of the arena that issued
//! them and double as lookup keys into the generated-types context after code generation.

use std::fmt;

/// Identifies one type descriptor within a batch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHandle(u32);

impl TypeHandle {
    /// Creates a handle from a raw arena index
    #[must_use]
    pub const fn new(index: u32) -> Self {
        TypeHandle(index)
    }

    /// The arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({})", self.0)
    }
}

/// Position of a method inside its declaring descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodSlot {
    /// Index into the added methods
    Method(u32),
    /// Index into the added constructors
    Constructor(u32),
    /// The type initializer
    TypeInitializer,
}

/// Identifies a method, constructor or type initializer descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle {
    /// The declaring descriptor
    pub owner: TypeHandle,
    /// Position within the declaring descriptor
    pub slot: MethodSlot,
}

/// Identifies a field descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldHandle {
    /// The declaring descriptor
    pub owner: TypeHandle,
    /// Index into the added fields
    pub index: u32,
}

/// Identifies a property descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyHandle {
    /// The declaring descriptor
    pub owner: TypeHandle,
    /// Index into the added properties
    pub index: u32,
}

/// Identifies an event descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    /// The declaring descriptor
    pub owner: TypeHandle,
    /// Index into the added events
    pub index: u32,
}

pub(crate) fn to_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
