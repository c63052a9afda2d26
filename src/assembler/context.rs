//! Contexts handed to participants while a batch is being assembled.

use std::ops::{Deref, DerefMut};

use crate::{
    codegen::GeneratedTypesContext,
    identity::{AssembledTypeId, IdPart},
    model::{MutableType, TypeArena, TypeHandle},
    runtime::{TypeAttributes, TypeRc, TypeRegistry, TypeSignature},
    Result,
};

/// Callback run once the batch of a request has been generated
pub type GenerationCompletedCallback =
    Box<dyn FnOnce(&GeneratedTypesContext) -> Result<()> + Send>;

/// The descriptor batch of one request, shared by every participant
pub struct TypeAssemblyContext<'a> {
    registry: &'a TypeRegistry,
    arena: TypeArena,
    callbacks: Vec<GenerationCompletedCallback>,
}

impl<'a> TypeAssemblyContext<'a> {
    pub(crate) fn new(registry: &'a TypeRegistry, arena: TypeArena) -> Self {
        TypeAssemblyContext {
            registry,
            arena,
            callbacks: Vec::new(),
        }
    }

    /// The registry generated types will be registered in
    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    /// All descriptors of the batch
    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    /// Looks up a descriptor of the batch
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for a handle of another batch.
    pub fn get(&self, handle: TypeHandle) -> Result<&MutableType> {
        self.arena.type_ref(handle)
    }

    /// Looks up a descriptor of the batch for editing
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for a handle of another batch.
    pub fn type_mut(&mut self, handle: TypeHandle) -> Result<&mut MutableType> {
        self.arena.type_mut(handle)
    }

    /// Creates an additional top-level type generated together with the proxy
    ///
    /// # Errors
    /// See [`TypeArena::create_type`].
    pub fn create_additional_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        base: Option<TypeSignature>,
    ) -> Result<TypeHandle> {
        self.arena.create_type(namespace, name, flags, base)
    }

    /// Creates an additional interface generated together with the proxy
    ///
    /// # Errors
    /// See [`TypeArena::create_interface`].
    pub fn create_interface(&mut self, namespace: &str, name: &str) -> Result<TypeHandle> {
        self.arena.create_interface(namespace, name)
    }

    /// Creates a type nested in a descriptor of the batch
    ///
    /// # Errors
    /// See [`TypeArena::add_nested_type`].
    pub fn add_nested_type(
        &mut self,
        outer: TypeHandle,
        name: &str,
        flags: TypeAttributes,
        base: Option<TypeSignature>,
    ) -> Result<TypeHandle> {
        self.arena.add_nested_type(outer, name, flags, base)
    }

    /// Registers a callback receiving the generated members once the batch is built.
    /// Callbacks run in registration order; none runs if generation fails.
    ///
    /// Callbacks run after the batch has been registered and added to the current module.
    /// If one fails the request fails and nothing is cached, but the generated types stay
    /// in the module and are flushed with it; a retry generates the batch again under new
    /// names.
    pub fn on_generation_completed<F>(&mut self, callback: F)
    where
        F: FnOnce(&GeneratedTypesContext) -> Result<()> + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub(crate) fn into_parts(self) -> (TypeArena, Vec<GenerationCompletedCallback>) {
        (self.arena, self.callbacks)
    }
}

/// The batch of a proxy request, as seen by one participant
pub struct ProxyTypeAssemblyContext<'a> {
    inner: TypeAssemblyContext<'a>,
    id: &'a AssembledTypeId,
    proxy: TypeHandle,
    pub(crate) participant_index: usize,
}

impl<'a> ProxyTypeAssemblyContext<'a> {
    pub(crate) fn new(
        inner: TypeAssemblyContext<'a>,
        id: &'a AssembledTypeId,
        proxy: TypeHandle,
    ) -> Self {
        ProxyTypeAssemblyContext {
            inner,
            id,
            proxy,
            participant_index: 0,
        }
    }

    /// Identifier of the request
    pub fn id(&self) -> &AssembledTypeId {
        self.id
    }

    /// The type the proxy derives from
    pub fn requested_type(&self) -> &TypeRc {
        self.id.requested_type()
    }

    /// The id part contributed by the participant currently running
    pub fn own_part(&self) -> Option<&IdPart> {
        self.id.part(self.participant_index)
    }

    /// Handle of the proxy descriptor
    pub fn proxy_handle(&self) -> TypeHandle {
        self.proxy
    }

    /// The proxy descriptor
    ///
    /// # Errors
    /// Never fails for a context created by the assembler.
    pub fn proxy(&self) -> Result<&MutableType> {
        self.inner.get(self.proxy)
    }

    /// The proxy descriptor for editing
    ///
    /// # Errors
    /// Never fails for a context created by the assembler.
    pub fn proxy_mut(&mut self) -> Result<&mut MutableType> {
        self.inner.type_mut(self.proxy)
    }

    pub(crate) fn into_inner(self) -> TypeAssemblyContext<'a> {
        self.inner
    }
}

impl<'a> Deref for ProxyTypeAssemblyContext<'a> {
    type Target = TypeAssemblyContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ProxyTypeAssemblyContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

/// The batch of an additional-type request
pub struct AdditionalTypeAssemblyContext<'a> {
    inner: TypeAssemblyContext<'a>,
    additional_id: &'a IdPart,
}

impl<'a> AdditionalTypeAssemblyContext<'a> {
    pub(crate) fn new(inner: TypeAssemblyContext<'a>, additional_id: &'a IdPart) -> Self {
        AdditionalTypeAssemblyContext {
            inner,
            additional_id,
        }
    }

    /// The identifier the additional type is requested for
    pub fn additional_id(&self) -> &IdPart {
        self.additional_id
    }

    pub(crate) fn into_inner(self) -> TypeAssemblyContext<'a> {
        self.inner
    }
}

impl<'a> Deref for AdditionalTypeAssemblyContext<'a> {
    type Target = TypeAssemblyContext<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for AdditionalTypeAssemblyContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
