//! Members of runtime types.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use strum::Display;

use crate::{
    runtime::{
        interpreter::Interpreter, EventAttributes, Expr, FieldAttributes, MemberAccess,
        MethodAttributes, MethodSignature, ObjectRef, PropertyAttributes, Token, TypeRc,
        TypeRef, TypeSignature, Value,
    },
    Result,
};

/// Reference to a [`RuntimeField`]
pub type FieldRc = Arc<RuntimeField>;
/// Reference to a [`RuntimeMethod`]
pub type MethodRc = Arc<RuntimeMethod>;
/// Reference to a [`RuntimeProperty`]
pub type PropertyRc = Arc<RuntimeProperty>;
/// Reference to a [`RuntimeEvent`]
pub type EventRc = Arc<RuntimeEvent>;

/// A field of a runtime type
pub struct RuntimeField {
    /// Token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Field type
    pub signature: TypeSignature,
    /// Field flags
    pub flags: FieldAttributes,
    /// All custom attributes applied to this field
    pub custom_attributes: Arc<boxcar::Vec<CustomAttribute>>,
    declaring: TypeRef,
}

impl RuntimeField {
    /// Creates a new field declared by `declaring`
    pub fn new(
        token: Token,
        name: impl Into<String>,
        declaring: &TypeRc,
        signature: TypeSignature,
        flags: FieldAttributes,
    ) -> Self {
        RuntimeField {
            token,
            name: name.into(),
            signature,
            flags,
            custom_attributes: Arc::new(boxcar::Vec::new()),
            declaring: TypeRef::new(declaring),
        }
    }

    /// The declaring type, if it is still alive
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRc> {
        self.declaring.upgrade()
    }

    /// Returns true for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }
}

impl fmt::Debug for RuntimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.signature, self.name, self.token)
    }
}

/// A weak reference to a [`RuntimeField`]
#[derive(Clone)]
pub struct FieldRef {
    weak_ref: Weak<RuntimeField>,
}

impl FieldRef {
    /// Create a new `FieldRef` from a strong reference
    #[must_use]
    pub fn new(strong_ref: &FieldRc) -> Self {
        FieldRef {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the field, returning None if it has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<FieldRc> {
        self.weak_ref.upgrade()
    }
}

/// What a [`RuntimeMethod`] is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MethodKind {
    /// A regular static or instance method
    Method,
    /// An instance constructor
    Constructor,
    /// The static type initializer
    TypeInitializer,
}

/// A method, constructor or type initializer of a runtime type
pub struct RuntimeMethod {
    /// Token
    pub token: Token,
    /// Method name (`.ctor` and `.cctor` for constructors)
    pub name: String,
    /// Method kind
    pub kind: MethodKind,
    /// Method flags
    pub flags: MethodAttributes,
    /// Return and parameter types
    pub signature: MethodSignature,
    /// All custom attributes applied to this method
    pub custom_attributes: Arc<boxcar::Vec<CustomAttribute>>,
    declaring: TypeRef,
    body: OnceLock<Expr>,
}

impl RuntimeMethod {
    /// Creates a new method without body
    pub fn new(
        token: Token,
        name: impl Into<String>,
        declaring: &TypeRc,
        kind: MethodKind,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> Self {
        RuntimeMethod {
            token,
            name: name.into(),
            kind,
            flags,
            signature,
            custom_attributes: Arc::new(boxcar::Vec::new()),
            declaring: TypeRef::new(declaring),
            body: OnceLock::new(),
        }
    }

    /// The declaring type, if it is still alive
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRc> {
        self.declaring.upgrade()
    }

    /// The method body, once it has been set
    #[must_use]
    pub fn body(&self) -> Option<&Expr> {
        self.body.get()
    }

    /// Sets the method body
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the method already has a body or is abstract.
    pub fn set_body(&self, body: Expr) -> Result<()> {
        if self.is_abstract() {
            return Err(invalid_operation!(
                "Abstract method '{}' cannot have a body",
                self.full_name()
            ));
        }
        self.body
            .set(body)
            .map_err(|_| invalid_operation!("Method '{}' already has a body", self.full_name()))
    }

    /// Access level
    #[must_use]
    pub fn access(&self) -> MemberAccess {
        self.flags.access()
    }

    /// Returns true for static methods and type initializers
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns true for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    /// Returns true for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    /// Returns true for sealed virtual methods
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.flags.contains(MethodAttributes::FINAL)
    }

    /// Returns true if the method opens a new virtual slot
    #[must_use]
    pub fn is_new_slot(&self) -> bool {
        self.flags.contains(MethodAttributes::NEW_SLOT)
    }

    /// Returns true for instance constructors
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor
    }

    /// `Namespace.Type::Name` for diagnostics
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.declaring_type() {
            Some(ty) => format!("{}::{}", ty.fullname(), self.name),
            None => self.name.clone(),
        }
    }

    /// Returns the method that introduced the virtual slot this method occupies.
    ///
    /// A method that is not virtual, is marked new-slot, or does not override anything
    /// is its own root. Otherwise the chain of overridden methods is followed through
    /// explicit overrides first and name/signature matches in the base types second.
    #[must_use]
    pub fn slot_root(self: &Arc<Self>) -> MethodRc {
        let mut current = self.clone();
        loop {
            if !current.is_virtual() || current.is_new_slot() {
                return current;
            }
            let Some(declaring) = current.declaring_type() else {
                return current;
            };

            let explicit = declaring
                .overrides
                .iter()
                .find(|(_, entry)| entry.body.token == current.token)
                .map(|(_, entry)| entry.declaration.clone())
                .filter(|declaration| {
                    declaration
                        .declaring_type()
                        .is_some_and(|owner| !owner.is_interface())
                });
            if let Some(declaration) = explicit {
                current = declaration;
                continue;
            }

            let mut overridden = None;
            let mut base = declaring.base();
            while let Some(ty) = base {
                if let Some(found) = ty.find_virtual(&current.name, &current.signature) {
                    overridden = Some(found);
                    break;
                }
                base = ty.base();
            }

            match overridden {
                Some(method) => current = method,
                None => return current,
            }
        }
    }

    /// Invokes the method with a fresh interpreter
    ///
    /// # Errors
    /// Returns any error raised while executing the body.
    pub fn invoke(self: &Arc<Self>, this: Option<&ObjectRef>, arguments: &[Value]) -> Result<Value> {
        Interpreter::new().invoke(self, this, arguments)
    }
}

impl fmt::Debug for RuntimeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.full_name(), self.signature, self.token)
    }
}

/// A weak reference to a [`RuntimeMethod`]
#[derive(Clone)]
pub struct MethodRef {
    weak_ref: Weak<RuntimeMethod>,
}

impl MethodRef {
    /// Create a new `MethodRef` from a strong reference
    #[must_use]
    pub fn new(strong_ref: &MethodRc) -> Self {
        MethodRef {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the method, returning None if it has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<MethodRc> {
        self.weak_ref.upgrade()
    }

    /// Get the token of the referenced method (if still alive)
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        self.upgrade().map(|m| m.token)
    }
}

/// A property and its accessors
pub struct RuntimeProperty {
    /// Token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Property type
    pub signature: TypeSignature,
    /// Property flags
    pub flags: PropertyAttributes,
    /// The get accessor
    pub getter: Option<MethodRc>,
    /// The set accessor
    pub setter: Option<MethodRc>,
    declaring: TypeRef,
}

impl RuntimeProperty {
    /// Creates a new property
    pub fn new(
        token: Token,
        name: impl Into<String>,
        declaring: &TypeRc,
        signature: TypeSignature,
        flags: PropertyAttributes,
        getter: Option<MethodRc>,
        setter: Option<MethodRc>,
    ) -> Self {
        RuntimeProperty {
            token,
            name: name.into(),
            signature,
            flags,
            getter,
            setter,
            declaring: TypeRef::new(declaring),
        }
    }

    /// The declaring type, if it is still alive
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRc> {
        self.declaring.upgrade()
    }
}

/// An event and its accessors
pub struct RuntimeEvent {
    /// Token
    pub token: Token,
    /// Event name
    pub name: String,
    /// Handler type
    pub event_type: TypeSignature,
    /// Event flags
    pub flags: EventAttributes,
    /// The add accessor
    pub add_method: MethodRc,
    /// The remove accessor
    pub remove_method: MethodRc,
    /// The optional raise method
    pub raise_method: Option<MethodRc>,
    declaring: TypeRef,
}

impl RuntimeEvent {
    /// Creates a new event
    pub fn new(
        token: Token,
        name: impl Into<String>,
        declaring: &TypeRc,
        event_type: TypeSignature,
        flags: EventAttributes,
        add_method: MethodRc,
        remove_method: MethodRc,
        raise_method: Option<MethodRc>,
    ) -> Self {
        RuntimeEvent {
            token,
            name: name.into(),
            event_type,
            flags,
            add_method,
            remove_method,
            raise_method,
            declaring: TypeRef::new(declaring),
        }
    }

    /// The declaring type, if it is still alive
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeRc> {
        self.declaring.upgrade()
    }
}

/// A custom attribute applied to a type or member
#[derive(Clone)]
pub struct CustomAttribute {
    /// Attribute constructor
    pub constructor: MethodRc,
    /// Positional constructor arguments
    pub arguments: Vec<Value>,
    /// Named field or property arguments
    pub named_arguments: Vec<(String, Value)>,
}

impl CustomAttribute {
    /// The attribute type
    #[must_use]
    pub fn attribute_type(&self) -> Option<TypeRc> {
        self.constructor.declaring_type()
    }
}

impl fmt::Debug for CustomAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAttribute")
            .field("constructor", &self.constructor.full_name())
            .field("arguments", &self.arguments)
            .field("named_arguments", &self.named_arguments)
            .finish()
    }
}

/// An explicit override: `body` implements the slot of `declaration`
#[derive(Clone)]
pub struct MethodOverride {
    /// The overridden base or interface method
    pub declaration: MethodRc,
    /// The implementing method of the declaring type
    pub body: MethodRc,
}
