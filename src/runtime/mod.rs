//! In-process type system targeted by the code generator.
//!
//! Requested types are described with [`ClassBuilder`], generated types are produced by the
//! [`crate::codegen`] backend, and both live in one [`TypeRegistry`]. Generated code is an
//! [`Expr`] tree executed by the interpreter with virtual and interface dispatch.
//!
//! # Key Components
//!
//! - [`RuntimeType`]: A loadable class or interface with its members
//! - [`TypeRegistry`]: Central, thread-safe registry owning all types
//! - [`ClassBuilder`]: Fluent construction of hand-written (requested) types
//! - [`Value`] / [`Object`]: Runtime values and instances
//!
//! # Examples
//!
//! ```rust,no_run
//! use typeforge::runtime::{ClassBuilder, Expr, TypeRegistry, TypeSignature};
//!
//! let registry = TypeRegistry::new()?;
//! let greeter = ClassBuilder::new("App", "Greeter")
//!     .public()
//!     .default_constructor()
//!     .method("Greet", |m| m.public().returns(TypeSignature::String).body(Expr::constant("hi")))
//!     .build(&registry)?;
//!
//! let instance = greeter.create_instance(&[])?;
//! assert_eq!(instance.call("Greet", &[])?.as_str(), Some("hi"));
//! # Ok::<(), typeforge::Error>(())
//! ```

mod builder;
mod expr;
mod flags;
pub(crate) mod interpreter;
mod member;
mod registry;
mod signature;
mod token;
mod value;

use std::{
    cell::Cell,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock, Weak,
    },
};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use strum::Display;

pub use builder::{ClassBuilder, MethodBuilder};
pub use expr::{BinaryOp, Dispatch, Expr, FieldTarget, MethodTarget};
pub use flags::{
    EventAttributes, FieldAttributes, MemberAccess, MethodAttributes, PropertyAttributes,
    TypeAttributes,
};
pub use member::{
    CustomAttribute, EventRc, FieldRc, FieldRef, MethodKind, MethodOverride, MethodRc,
    MethodRef, PropertyRc, RuntimeEvent, RuntimeField, RuntimeMethod, RuntimeProperty,
};
pub use registry::{CoreTypes, TypeRegistry};
pub use signature::{MethodSignature, ParameterDeclaration, TypeSignature};
pub use token::{Token, TokenKind};
pub use value::{Object, ObjectRef, Value};

/// Reference to a `RuntimeType`
pub type TypeRc = Arc<RuntimeType>;
/// A vector that holds a list of `RuntimeType`
pub type TypeList = Arc<boxcar::Vec<TypeRc>>;

/// A smart reference to a `RuntimeType` that holds a weak reference, so that member
/// signatures of mutually referencing types do not keep each other alive
#[derive(Clone)]
pub struct TypeRef {
    weak_ref: Weak<RuntimeType>,
}

impl TypeRef {
    /// Create a new `TypeRef` from a strong reference
    #[must_use]
    pub fn new(strong_ref: &TypeRc) -> Self {
        Self {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the type, returning None if the type has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeRc> {
        self.weak_ref.upgrade()
    }

    /// Check if the referenced type is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }

    /// Get the token of the referenced type (if still alive)
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|t| t.token)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.weak_ref, &other.weak_ref)
    }
}

impl Eq for TypeRef {}

impl From<TypeRc> for TypeRef {
    fn from(strong_ref: TypeRc) -> Self {
        Self::new(&strong_ref)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(ty) => write!(f, "TypeRef({})", ty.fullname()),
            None => write!(f, "TypeRef(<dropped>)"),
        }
    }
}

/// Where a runtime type came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TypeOrigin {
    /// Built by hand through [`ClassBuilder`] or part of the core types
    Native,
    /// Produced by the code generator in this process
    Generated,
    /// Re-created from a flushed module
    Loaded,
}

/// A loadable class or interface.
///
/// Members are appended while the type is being built; once [`RuntimeType::is_complete`]
/// reports true the type is registered and may be instantiated.
pub struct RuntimeType {
    /// Token
    pub token: Token,
    /// Namespace (empty for nested types)
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Flags
    pub flags: TypeAttributes,
    /// Origin of this type
    pub origin: TypeOrigin,
    /// All interfaces this type implements directly
    pub interfaces: TypeList,
    /// All fields this type declares
    pub fields: Arc<boxcar::Vec<FieldRc>>,
    /// All instance constructors this type declares
    pub constructors: Arc<boxcar::Vec<MethodRc>>,
    /// All methods this type declares
    pub methods: Arc<boxcar::Vec<MethodRc>>,
    /// All properties this type declares
    pub properties: Arc<boxcar::Vec<PropertyRc>>,
    /// All events this type declares
    pub events: Arc<boxcar::Vec<EventRc>>,
    /// All types that are nested inside this type
    pub nested_types: Arc<boxcar::Vec<TypeRef>>,
    /// All custom attributes applied to this type
    pub custom_attributes: Arc<boxcar::Vec<CustomAttribute>>,
    /// All explicit method overrides of this type
    pub overrides: Arc<boxcar::Vec<MethodOverride>>,
    base: OnceLock<TypeRc>,
    declaring: OnceLock<TypeRef>,
    type_initializer: OnceLock<MethodRc>,
    statics: DashMap<Token, Value>,
    complete: AtomicBool,
    initialized: AtomicBool,
    initializing: ReentrantMutex<Cell<bool>>,
}

impl RuntimeType {
    /// Create a new, empty instance of a `RuntimeType`
    pub fn new(
        token: Token,
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
        origin: TypeOrigin,
    ) -> Self {
        RuntimeType {
            token,
            namespace: namespace.into(),
            name: name.into(),
            flags,
            origin,
            interfaces: Arc::new(boxcar::Vec::new()),
            fields: Arc::new(boxcar::Vec::new()),
            constructors: Arc::new(boxcar::Vec::new()),
            methods: Arc::new(boxcar::Vec::new()),
            properties: Arc::new(boxcar::Vec::new()),
            events: Arc::new(boxcar::Vec::new()),
            nested_types: Arc::new(boxcar::Vec::new()),
            custom_attributes: Arc::new(boxcar::Vec::new()),
            overrides: Arc::new(boxcar::Vec::new()),
            base: OnceLock::new(),
            declaring: OnceLock::new(),
            type_initializer: OnceLock::new(),
            statics: DashMap::new(),
            complete: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            initializing: ReentrantMutex::new(Cell::new(false)),
        }
    }

    /// Access the base type of this type, if it exists
    pub fn base(&self) -> Option<TypeRc> {
        self.base.get().cloned()
    }

    /// Sets the base type
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the base was already set.
    pub fn set_base(&self, base: TypeRc) -> crate::Result<()> {
        self.base
            .set(base)
            .map_err(|_| invalid_operation!("Base type of '{}' is already set", self.fullname()))
    }

    /// The enclosing type of a nested type
    pub fn declaring_type(&self) -> Option<TypeRc> {
        self.declaring.get().and_then(TypeRef::upgrade)
    }

    /// Sets the enclosing type of a nested type
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the enclosing type was already set.
    pub fn set_declaring_type(&self, declaring: &TypeRc) -> crate::Result<()> {
        self.declaring.set(TypeRef::new(declaring)).map_err(|_| {
            invalid_operation!("Declaring type of '{}' is already set", self.name)
        })
    }

    /// The static type initializer, if any
    pub fn type_initializer(&self) -> Option<MethodRc> {
        self.type_initializer.get().cloned()
    }

    /// Sets the static type initializer
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if a type initializer exists.
    pub fn set_type_initializer(&self, initializer: MethodRc) -> crate::Result<()> {
        self.type_initializer.set(initializer).map_err(|_| {
            invalid_operation!("Type '{}' already has a type initializer", self.fullname())
        })
    }

    /// Returns the full name (Namespace.Name, Outer+Inner for nested types)
    pub fn fullname(&self) -> String {
        if let Some(declaring) = self.declaring_type() {
            format!("{}+{}", declaring.fullname(), self.name)
        } else if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns true for interfaces
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Returns true for abstract types and interfaces
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeAttributes::ABSTRACT) || self.is_interface()
    }

    /// Returns true if the type cannot be derived from
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED)
    }

    /// Returns true once the type has been finalized and may be instantiated
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Returns true if `self` derives (directly or indirectly) from `other`
    pub fn is_subclass_of(&self, other: &RuntimeType) -> bool {
        let mut current = self.base();
        while let Some(ty) = current {
            if ty.token == other.token {
                return true;
            }
            current = ty.base();
        }
        false
    }

    /// Returns true if `self` or one of its bases implements the interface `other`
    pub fn implements(&self, other: &RuntimeType) -> bool {
        fn search(interfaces: &TypeList, target: Token) -> bool {
            interfaces
                .iter()
                .any(|(_, iface)| iface.token == target || search(&iface.interfaces, target))
        }

        if search(&self.interfaces, other.token) {
            return true;
        }
        self.base().is_some_and(|base| base.implements(other))
    }

    /// Returns true if an instance of `self` can be used where `other` is expected
    pub fn is_assignable_to(&self, other: &RuntimeType) -> bool {
        self.token == other.token || self.is_subclass_of(other) || self.implements(other)
    }

    /// This type followed by all its base types, most derived first
    pub fn hierarchy(self: &Arc<Self>) -> Vec<TypeRc> {
        let mut chain = vec![self.clone()];
        let mut current = self.base();
        while let Some(ty) = current {
            current = ty.base();
            chain.push(ty);
        }
        chain
    }

    /// All instance fields of this type and its bases, base fields first
    pub fn instance_fields(&self) -> Vec<FieldRc> {
        let mut fields = self
            .base()
            .map(|base| base.instance_fields())
            .unwrap_or_default();
        fields.extend(
            self.fields
                .iter()
                .filter(|(_, field)| !field.is_static())
                .map(|(_, field)| field.clone()),
        );
        fields
    }

    /// Finds a field by name on this type or its bases
    pub fn find_field(&self, name: &str) -> Option<FieldRc> {
        self.fields
            .iter()
            .find(|(_, field)| field.name == name)
            .map(|(_, field)| field.clone())
            .or_else(|| self.base().and_then(|base| base.find_field(name)))
    }

    /// Finds a method declared by this type by name
    pub fn find_method_by_name(&self, name: &str) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|(_, method)| method.name == name)
            .map(|(_, method)| method.clone())
    }

    /// Returns the field `name` of this type or its bases
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if there is no such field.
    pub fn field(&self, name: &str) -> crate::Result<FieldRc> {
        self.find_field(name)
            .ok_or_else(|| crate::Error::MissingMember {
                type_name: self.fullname(),
                member: name.to_string(),
            })
    }

    /// Returns the method `name` declared by this type
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if there is no such method.
    pub fn method(&self, name: &str) -> crate::Result<MethodRc> {
        self.find_method_by_name(name)
            .ok_or_else(|| crate::Error::MissingMember {
                type_name: self.fullname(),
                member: name.to_string(),
            })
    }

    /// Finds a method declared by this type by name and signature
    pub fn find_method(&self, name: &str, signature: &MethodSignature) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|(_, method)| method.name == name && method.signature.matches(signature))
            .map(|(_, method)| method.clone())
    }

    /// Finds a virtual method declared by this type by name and signature
    pub fn find_virtual(&self, name: &str, signature: &MethodSignature) -> Option<MethodRc> {
        self.find_method(name, signature)
            .filter(|method| method.is_virtual())
    }

    /// Finds an instance method by name and arity on this type or its bases, most derived first
    pub fn lookup_method(&self, name: &str, arity: usize) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|(_, method)| {
                method.name == name && method.signature.arity() == arity && !method.is_static()
            })
            .map(|(_, method)| method.clone())
            .or_else(|| self.base().and_then(|base| base.lookup_method(name, arity)))
    }

    /// Finds a constructor declared by this type with exactly these parameter types
    pub fn find_constructor(&self, parameters: &[TypeSignature]) -> Option<MethodRc> {
        self.constructors
            .iter()
            .find(|(_, ctor)| ctor.signature.parameter_types() == parameters)
            .map(|(_, ctor)| ctor.clone())
    }

    /// All methods declared by this type in definition order
    pub fn method_list(&self) -> Vec<MethodRc> {
        self.methods.iter().map(|(_, m)| m.clone()).collect()
    }

    /// All constructors declared by this type in definition order
    pub fn constructor_list(&self) -> Vec<MethodRc> {
        self.constructors.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Resolves the implementation a virtual call to `declared` executes on an instance of `self`.
    ///
    /// Interface methods are resolved through the interface map. Class methods are resolved by
    /// comparing virtual slots along the hierarchy, most derived type first; non-virtual
    /// methods resolve to themselves.
    pub fn resolve_virtual(self: &Arc<Self>, declared: &MethodRc) -> MethodRc {
        if !declared.is_virtual() {
            return declared.clone();
        }
        if declared
            .declaring_type()
            .is_some_and(|owner| owner.is_interface())
        {
            return self
                .resolve_interface_method(declared)
                .unwrap_or_else(|| declared.clone());
        }

        let root = declared.slot_root();
        for ty in self.hierarchy() {
            let explicit = ty
                .overrides
                .iter()
                .find(|(_, entry)| entry.declaration.slot_root().token == root.token)
                .map(|(_, entry)| entry.body.clone());
            if let Some(body) = explicit {
                return body;
            }

            let implicit = ty
                .methods
                .iter()
                .find(|(_, method)| method.is_virtual() && method.slot_root().token == root.token)
                .map(|(_, method)| method.clone());
            if let Some(method) = implicit {
                return method;
            }
        }

        declared.clone()
    }

    /// Resolves the method implementing the interface method `interface_method` for `self`.
    ///
    /// Explicit overrides take precedence over public virtual methods with a matching name
    /// and signature; the search runs from the most derived type upwards and the result is
    /// dispatched virtually.
    pub fn resolve_interface_method(self: &Arc<Self>, interface_method: &MethodRc) -> Option<MethodRc> {
        for ty in self.hierarchy() {
            let explicit = ty
                .overrides
                .iter()
                .find(|(_, entry)| entry.declaration.token == interface_method.token)
                .map(|(_, entry)| entry.body.clone());
            if explicit.is_some() {
                return explicit;
            }

            let implicit = ty
                .methods
                .iter()
                .find(|(_, method)| {
                    method.is_virtual()
                        && method.access() == MemberAccess::Public
                        && method.name == interface_method.name
                        && method.signature.matches(&interface_method.signature)
                })
                .map(|(_, method)| method.clone());
            if let Some(method) = implicit {
                return Some(self.resolve_virtual(&method));
            }
        }
        None
    }

    /// Creates an instance through the public constructor whose parameters accept `arguments`
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if no public constructor matches, or any error
    /// raised by the type initializer or the constructor body.
    pub fn create_instance(self: &Arc<Self>, arguments: &[Value]) -> crate::Result<ObjectRef> {
        let constructor = self
            .constructors
            .iter()
            .find(|(_, ctor)| {
                ctor.access() == MemberAccess::Public
                    && ctor.signature.arity() == arguments.len()
                    && ctor
                        .signature
                        .parameters
                        .iter()
                        .zip(arguments)
                        .all(|(parameter, argument)| parameter.ty.accepts(argument))
            })
            .map(|(_, ctor)| ctor.clone())
            .ok_or_else(|| crate::Error::MissingMember {
                type_name: self.fullname(),
                member: format!(".ctor/{}", arguments.len()),
            })?;

        interpreter::Interpreter::new().instantiate(&constructor, arguments)
    }

    /// Returns the custom attributes of type `attribute_type` applied to this type
    pub fn custom_attributes_of(&self, attribute_type: &RuntimeType) -> Vec<CustomAttribute> {
        self.custom_attributes
            .iter()
            .filter(|(_, attribute)| {
                attribute
                    .attribute_type()
                    .is_some_and(|ty| ty.is_assignable_to(attribute_type))
            })
            .map(|(_, attribute)| attribute.clone())
            .collect()
    }

    pub(crate) fn static_value(&self, field: &RuntimeField) -> Value {
        self.statics
            .get(&field.token)
            .map_or_else(|| field.signature.default_value(), |value| value.clone())
    }

    pub(crate) fn set_static_value(&self, field: &RuntimeField, value: Value) {
        self.statics.insert(field.token, value);
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub(crate) fn lock_initialization(&self) -> ReentrantMutexGuard<'_, Cell<bool>> {
        self.initializing.lock()
    }
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("token", &self.token)
            .field("fullname", &self.fullname())
            .field("flags", &self.flags)
            .field("origin", &self.origin)
            .field("complete", &self.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::{animal_hierarchy, registry};

    #[test]
    fn test_fullname_of_nested_type() {
        let registry = registry();
        let outer = ClassBuilder::new("App", "Outer")
            .public()
            .build(&registry)
            .unwrap();
        let inner = ClassBuilder::new("App", "Inner")
            .nested_in(&outer)
            .build(&registry)
            .unwrap();

        assert_eq!(inner.fullname(), "App.Outer+Inner");
        assert_eq!(outer.nested_types.count(), 1);
    }

    #[test]
    fn test_subclass_and_assignability() {
        let registry = registry();
        let (animal, dog, speaker) = animal_hierarchy(&registry);

        assert!(dog.is_subclass_of(&animal));
        assert!(!animal.is_subclass_of(&dog));
        assert!(dog.is_assignable_to(&speaker));
        assert!(dog.is_assignable_to(&registry.core().object));
        assert!(!registry.core().object.is_assignable_to(&animal));
    }

    #[test]
    fn test_virtual_resolution_prefers_most_derived_override() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);

        let base_speak = animal.find_method_by_name("Speak").unwrap();
        let resolved = dog.resolve_virtual(&base_speak);
        assert_eq!(resolved.declaring_type().unwrap().token, dog.token);

        let sleep = animal.find_method_by_name("Sleep").unwrap();
        assert_eq!(dog.resolve_virtual(&sleep).token, sleep.token);
    }

    #[test]
    fn test_slot_root_of_override_is_base_method() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);

        let base_speak = animal.find_method_by_name("Speak").unwrap();
        let dog_speak = dog.find_method_by_name("Speak").unwrap();
        assert_eq!(dog_speak.slot_root().token, base_speak.token);
    }

    #[test]
    fn test_interface_resolution() {
        let registry = registry();
        let (_, dog, speaker) = animal_hierarchy(&registry);

        let speak = speaker.find_method_by_name("Speak").unwrap();
        let resolved = dog.resolve_interface_method(&speak).unwrap();
        assert_eq!(resolved.declaring_type().unwrap().token, dog.token);
    }
}
