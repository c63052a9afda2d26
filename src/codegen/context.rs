//! State shared by the per-type generators of one batch.

use std::collections::HashMap;

use crate::{
    codegen::TypeBuilder,
    model::{EventHandle, FieldHandle, MethodHandle, PropertyHandle, TypeHandle},
    runtime::{EventRc, FieldRc, MethodRc, PropertyRc, TypeRc},
    Result,
};

/// Maps descriptor handles to the real members emitted for them
#[derive(Default)]
pub struct EmittableMemberMap {
    types: HashMap<TypeHandle, TypeRc>,
    fields: HashMap<FieldHandle, FieldRc>,
    methods: HashMap<MethodHandle, MethodRc>,
    properties: HashMap<PropertyHandle, PropertyRc>,
    events: HashMap<EventHandle, EventRc>,
}

macro_rules! member_accessors {
    ($add:ident, $get:ident, $map:ident, $handle:ty, $member:ty, $kind:literal) => {
        pub(crate) fn $add(&mut self, handle: $handle, member: $member) -> Result<()> {
            if self.$map.insert(handle, member).is_some() {
                return Err(invalid_operation!(
                    "{} {:?} was emitted twice",
                    $kind,
                    handle
                ));
            }
            Ok(())
        }

        /// Looks up the member emitted for `handle`
        ///
        /// # Errors
        /// Returns [`crate::Error::InvalidOperation`] if nothing was emitted for the handle.
        pub fn $get(&self, handle: $handle) -> Result<$member> {
            self.$map.get(&handle).cloned().ok_or_else(|| {
                invalid_operation!("{} {:?} has not been emitted", $kind, handle)
            })
        }
    };
}

impl EmittableMemberMap {
    member_accessors!(add_type, get_type, types, TypeHandle, TypeRc, "Type");
    member_accessors!(add_field, get_field, fields, FieldHandle, FieldRc, "Field");
    member_accessors!(add_method, get_method, methods, MethodHandle, MethodRc, "Method");
    member_accessors!(
        add_property,
        get_property,
        properties,
        PropertyHandle,
        PropertyRc,
        "Property"
    );
    member_accessors!(add_event, get_event, events, EventHandle, EventRc, "Event");
}

/// Type builders of a batch by descriptor handle
pub(crate) type BuilderMap = HashMap<TypeHandle, Box<dyn TypeBuilder>>;

/// Work that needs every type of the batch declared and defined
pub(crate) type PostDeclarationAction =
    Box<dyn FnOnce(&EmittableMemberMap, &mut BuilderMap) -> Result<()>>;

/// Builders, emitted members and queued actions of one batch
#[derive(Default)]
pub(crate) struct CodeGenerationContext {
    pub(crate) members: EmittableMemberMap,
    pub(crate) builders: BuilderMap,
    actions: Vec<PostDeclarationAction>,
}

impl CodeGenerationContext {
    pub(crate) fn new() -> Self {
        CodeGenerationContext::default()
    }

    pub(crate) fn builder(&mut self, handle: TypeHandle) -> Result<&mut Box<dyn TypeBuilder>> {
        self.builders
            .get_mut(&handle)
            .ok_or_else(|| invalid_operation!("{:?} has not been declared", handle))
    }

    pub(crate) fn post_declaration(&mut self, action: PostDeclarationAction) {
        self.actions.push(action);
    }

    pub(crate) fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Runs the queued actions in the order they were added
    pub(crate) fn run_post_declaration_actions(&mut self) -> Result<()> {
        for action in std::mem::take(&mut self.actions) {
            action(&self.members, &mut self.builders)?;
        }
        Ok(())
    }

    pub(crate) fn into_members(self) -> EmittableMemberMap {
        self.members
    }
}

/// The real types and members generated for one batch, by descriptor handle
pub struct GeneratedTypesContext {
    members: EmittableMemberMap,
    types: Vec<(TypeHandle, TypeRc)>,
}

impl GeneratedTypesContext {
    pub(crate) fn new(members: EmittableMemberMap, types: Vec<(TypeHandle, TypeRc)>) -> Self {
        GeneratedTypesContext { members, types }
    }

    /// The type generated for a descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a handle outside the batch.
    pub fn get_type(&self, handle: TypeHandle) -> Result<TypeRc> {
        self.members.get_type(handle)
    }

    /// The field generated for a field descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a handle outside the batch.
    pub fn get_field(&self, handle: FieldHandle) -> Result<FieldRc> {
        self.members.get_field(handle)
    }

    /// The method generated for a method, constructor or type initializer descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a handle outside the batch.
    pub fn get_method(&self, handle: MethodHandle) -> Result<MethodRc> {
        self.members.get_method(handle)
    }

    /// The property generated for a property descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a handle outside the batch.
    pub fn get_property(&self, handle: PropertyHandle) -> Result<PropertyRc> {
        self.members.get_property(handle)
    }

    /// The event generated for an event descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] for a handle outside the batch.
    pub fn get_event(&self, handle: EventHandle) -> Result<EventRc> {
        self.members.get_event(handle)
    }

    /// All generated types in finalization order
    pub fn types(&self) -> impl Iterator<Item = &TypeRc> {
        self.types.iter().map(|(_, ty)| ty)
    }

    /// Number of generated types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the batch produced no type
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
