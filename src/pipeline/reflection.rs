//! Type-level access to a pipeline.

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    assembler::TypeAssembler,
    cache::{ConstructorCallCache, ConstructorDelegate, TypeCache},
    identity::{AssembledTypeId, IdPart},
    runtime::{ObjectRef, TypeRc, TypeSignature, Value},
    Result,
};

/// Generated types, identifiers and constructor delegates of a pipeline
pub struct ReflectionService {
    assembler: Arc<TypeAssembler>,
    type_cache: Arc<TypeCache>,
    constructors: Arc<ConstructorCallCache>,
}

impl ReflectionService {
    pub(crate) fn new(
        assembler: Arc<TypeAssembler>,
        type_cache: Arc<TypeCache>,
        constructors: Arc<ConstructorCallCache>,
    ) -> Self {
        ReflectionService {
            assembler,
            type_cache,
            constructors,
        }
    }

    /// Returns true if `ty` was generated by a pipeline
    pub fn is_assembled_type(&self, ty: &TypeRc) -> bool {
        self.assembler.is_assembled_type(ty)
    }

    /// The requested type a generated type derives from
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if `assembled` was not generated by a pipeline.
    pub fn get_requested_type(&self, assembled: &TypeRc) -> Result<TypeRc> {
        self.assembler.get_requested_type(assembled)
    }

    /// The identifier a request for `requested` has with this pipeline's participants
    pub fn get_type_id_for_requested_type(&self, requested: &TypeRc) -> AssembledTypeId {
        self.assembler.compute_type_id(requested)
    }

    /// The identifier stamped into a generated type
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if `assembled` was not generated by a pipeline.
    pub fn get_type_id_for_assembled_type(&self, assembled: &TypeRc) -> Result<AssembledTypeId> {
        self.assembler.extract_type_id(assembled)
    }

    /// The part a participant contributed to `id`
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if the participant is not configured.
    pub fn get_part(&self, id: &AssembledTypeId, participant: &str) -> Result<Option<IdPart>> {
        self.assembler.identifier_provider().get_part(id, participant)
    }

    /// The type generated for `requested`, or `requested` itself if no participant
    /// modifies it
    ///
    /// # Errors
    /// Any assembly error.
    pub fn get_assembled_type(&self, requested: &TypeRc) -> Result<TypeRc> {
        self.type_cache.get_or_create_type(requested)
    }

    /// The type generated for `id`
    ///
    /// # Errors
    /// Any assembly error.
    pub fn get_assembled_type_by_id(&self, id: &AssembledTypeId) -> Result<TypeRc> {
        self.type_cache.get_or_create_type_by_id(id)
    }

    /// Generates the types for many requested types in parallel, keeping their order
    ///
    /// # Errors
    /// The first assembly error in input order.
    pub fn get_assembled_types(&self, requested: &[TypeRc]) -> Result<Vec<TypeRc>> {
        requested
            .par_iter()
            .map(|ty| self.type_cache.get_or_create_type(ty))
            .collect()
    }

    /// The additional type a participant provides for `additional_id`
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if no participant knows the identifier.
    pub fn get_additional_type(&self, additional_id: &IdPart) -> Result<TypeRc> {
        self.type_cache.get_or_create_additional_type(additional_id)
    }

    /// The delegate calling the constructor of the type generated for `id` that best matches
    /// `parameters`
    ///
    /// # Errors
    /// See [`ConstructorCallCache::get_or_create`].
    pub fn get_constructor(
        &self,
        id: &AssembledTypeId,
        parameters: &[TypeSignature],
        allow_non_public: bool,
    ) -> Result<ConstructorDelegate> {
        self.constructors.get_or_create(id, parameters, allow_non_public)
    }

    /// Creates an instance of the type generated for `id`
    ///
    /// # Errors
    /// See [`ConstructorCallCache::get_or_create`], plus any error the constructor raises.
    pub fn instantiate_assembled_type(
        &self,
        id: &AssembledTypeId,
        arguments: &[Value],
        allow_non_public: bool,
    ) -> Result<ObjectRef> {
        let parameters: Vec<TypeSignature> = arguments.iter().map(signature_of).collect();
        self.get_constructor(id, &parameters, allow_non_public)?(arguments)
    }
}

/// The most specific signature describing `value`
pub(crate) fn signature_of(value: &Value) -> TypeSignature {
    match value {
        Value::Boolean(_) => TypeSignature::Boolean,
        Value::I4(_) => TypeSignature::I4,
        Value::I8(_) => TypeSignature::I8,
        Value::R8(_) => TypeSignature::R8,
        Value::String(_) => TypeSignature::String,
        Value::Object(object) => TypeSignature::class(object.runtime_type()),
        Value::Void | Value::Null | Value::Type(_) | Value::Identifier(_) => TypeSignature::Object,
    }
}
