//! Type and method signatures.
//!
//! [`TypeSignature`] names the type of a field, parameter, return value, property or event.
//! Inside type descriptors a signature may point to another descriptor of the same batch
//! through [`TypeSignature::Mutable`]; the code generator replaces those with real
//! [`TypeSignature::Class`] references once every batch type has been declared.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::{
    model::TypeHandle,
    runtime::{TypeRc, TypeRef, Value},
};

/// The type of a value slot
#[derive(Clone)]
pub enum TypeSignature {
    /// No value, only valid as return type
    Void,
    /// `bool`
    Boolean,
    /// 32-bit signed integer
    I4,
    /// 64-bit signed integer
    I8,
    /// 64-bit floating point
    R8,
    /// Immutable string
    String,
    /// Any reference
    Object,
    /// A reference to a runtime class or interface
    Class(TypeRef),
    /// A reference to a descriptor of the batch currently being generated
    Mutable(TypeHandle),
}

impl TypeSignature {
    /// Creates a class signature for `ty`
    #[must_use]
    pub fn class(ty: &TypeRc) -> Self {
        TypeSignature::Class(TypeRef::new(ty))
    }

    /// Returns true for `void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// Returns true for every signature whose values are references
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeSignature::String
                | TypeSignature::Object
                | TypeSignature::Class(_)
                | TypeSignature::Mutable(_)
        )
    }

    /// Returns the referenced runtime type, if this is a live class signature
    #[must_use]
    pub fn runtime_type(&self) -> Option<TypeRc> {
        match self {
            TypeSignature::Class(ty) => ty.upgrade(),
            _ => None,
        }
    }

    /// Returns the referenced batch descriptor, if any
    #[must_use]
    pub fn mutable_handle(&self) -> Option<TypeHandle> {
        match self {
            TypeSignature::Mutable(handle) => Some(*handle),
            _ => None,
        }
    }

    /// The value a slot of this type holds before it is assigned
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            TypeSignature::Void => Value::Void,
            TypeSignature::Boolean => Value::Boolean(false),
            TypeSignature::I4 => Value::I4(0),
            TypeSignature::I8 => Value::I8(0),
            TypeSignature::R8 => Value::R8(0.0),
            _ => Value::Null,
        }
    }

    /// Returns true if a value of type `other` can be stored in a slot of this type
    #[must_use]
    pub fn is_assignable_from(&self, other: &TypeSignature) -> bool {
        if self == other {
            return true;
        }

        match (self, other) {
            (TypeSignature::Object, other) => other.is_reference(),
            (TypeSignature::Class(target), TypeSignature::Class(source)) => {
                match (target.upgrade(), source.upgrade()) {
                    (Some(target), Some(source)) => source.is_assignable_to(&target),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Returns true if `value` can be stored in a slot of this type
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeSignature::Void, Value::Void)
            | (TypeSignature::Boolean, Value::Boolean(_))
            | (TypeSignature::I4, Value::I4(_))
            | (TypeSignature::I8, Value::I8(_))
            | (TypeSignature::R8, Value::R8(_))
            | (TypeSignature::String, Value::String(_)) => true,
            (sig, Value::Null) => sig.is_reference(),
            (TypeSignature::Object, value) => !matches!(value, Value::Void),
            (TypeSignature::Class(target), Value::Object(object)) => target
                .upgrade()
                .is_some_and(|target| object.runtime_type().is_assignable_to(&target)),
            _ => false,
        }
    }
}

impl PartialEq for TypeSignature {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSignature::Class(left), TypeSignature::Class(right)) => left == right,
            (TypeSignature::Mutable(left), TypeSignature::Mutable(right)) => left == right,
            (TypeSignature::Class(_), _) | (TypeSignature::Mutable(_), _) => false,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl Eq for TypeSignature {}

impl Hash for TypeSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TypeSignature::Class(ty) => ty.token().hash(state),
            TypeSignature::Mutable(handle) => handle.hash(state),
            _ => {}
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Void => write!(f, "void"),
            TypeSignature::Boolean => write!(f, "bool"),
            TypeSignature::I4 => write!(f, "int32"),
            TypeSignature::I8 => write!(f, "int64"),
            TypeSignature::R8 => write!(f, "float64"),
            TypeSignature::String => write!(f, "string"),
            TypeSignature::Object => write!(f, "object"),
            TypeSignature::Class(ty) => match ty.upgrade() {
                Some(ty) => write!(f, "{}", ty.fullname()),
                None => write!(f, "<dropped type>"),
            },
            TypeSignature::Mutable(handle) => write!(f, "<descriptor {}>", handle.index()),
        }
    }
}

impl fmt::Debug for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A named method parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDeclaration {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeSignature,
}

impl ParameterDeclaration {
    /// Creates a new parameter declaration
    pub fn new(name: impl Into<String>, ty: TypeSignature) -> Self {
        ParameterDeclaration {
            name: name.into(),
            ty,
        }
    }
}

/// Return type and ordered parameters of a method
#[derive(Debug, Clone)]
pub struct MethodSignature {
    /// The return type
    pub return_type: TypeSignature,
    /// The ordered parameters
    pub parameters: Vec<ParameterDeclaration>,
}

impl MethodSignature {
    /// Creates a signature with generated parameter names (`arg0`, `arg1`, ...)
    #[must_use]
    pub fn new(return_type: TypeSignature, parameter_types: Vec<TypeSignature>) -> Self {
        let parameters = parameter_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| ParameterDeclaration::new(format!("arg{index}"), ty))
            .collect();
        MethodSignature {
            return_type,
            parameters,
        }
    }

    /// Creates a signature from named parameters
    #[must_use]
    pub fn with_parameters(return_type: TypeSignature, parameters: Vec<ParameterDeclaration>) -> Self {
        MethodSignature {
            return_type,
            parameters,
        }
    }

    /// A `void ()` signature
    #[must_use]
    pub fn void() -> Self {
        MethodSignature::new(TypeSignature::Void, Vec::new())
    }

    /// The parameter types in order
    #[must_use]
    pub fn parameter_types(&self) -> Vec<TypeSignature> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }

    /// Number of parameters
    #[must_use]
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Compares return and parameter types, ignoring parameter names
    #[must_use]
    pub fn matches(&self, other: &MethodSignature) -> bool {
        self.return_type == other.return_type && self.has_parameter_types(other)
    }

    /// Compares parameter types only
    #[must_use]
    pub fn has_parameter_types(&self, other: &MethodSignature) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(left, right)| left.ty == right.ty)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters = self
            .parameters
            .iter()
            .map(|p| p.ty.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{} ({})", self.return_type, parameters)
    }
}
