//! # typeforge Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the typeforge library. Import it to get quick access to everything needed for
//! writing participants and running a pipeline.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all typeforge operations
pub use crate::Error;

/// The result type used throughout typeforge
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The pipeline facade and its configuration
pub use crate::pipeline::{
    CodeManager, Pipeline, PipelineBuilder, PipelineSettings, ReflectionService,
};

// ================================================================================================
// Participants
// ================================================================================================

/// The extension point and the contexts it works on
pub use crate::assembler::{
    AdditionalType, AdditionalTypeAssemblyContext, LoadedProxyType, LoadedTypesContext,
    Participant, ParticipantState, ProxyTypeAssemblyContext, TypeAssemblyContext,
};

/// Request identifiers
pub use crate::identity::{AssembledTypeId, IdPart, TypeIdentifierProvider};

// ================================================================================================
// Descriptor Model
// ================================================================================================

/// Mutable descriptors and their handles
pub use crate::model::{
    CustomAttributeDeclaration, FieldHandle, MethodHandle, MutableType, TypeArena, TypeHandle,
};

/// Members of generated types after code generation
pub use crate::codegen::GeneratedTypesContext;

// ================================================================================================
// Runtime Type System
// ================================================================================================

/// Types, members and values
pub use crate::runtime::{
    ClassBuilder, Expr, FieldAttributes, MethodAttributes, MethodRc, MethodSignature,
    ObjectRef, ParameterDeclaration, TypeAttributes, TypeRc, TypeRegistry, TypeSignature,
    Value,
};
