//! Values and objects manipulated by generated code.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{
    identity::AssembledTypeId,
    runtime::{interpreter::Interpreter, FieldRc, RuntimeField, Token, TypeRc},
    Error, Result,
};

/// Reference to a heap allocated [`Object`]
pub type ObjectRef = Arc<Object>;

/// A runtime value
#[derive(Clone)]
pub enum Value {
    /// Result of a `void` call
    Void,
    /// The null reference
    Null,
    /// `bool`
    Boolean(bool),
    /// 32-bit signed integer
    I4(i32),
    /// 64-bit signed integer
    I8(i64),
    /// 64-bit floating point
    R8(f64),
    /// Immutable string
    String(Arc<str>),
    /// Object instance
    Object(ObjectRef),
    /// A runtime type used as a value (e.g. attribute arguments)
    Type(TypeRc),
    /// The identifier an assembled type was generated for
    Identifier(Arc<AssembledTypeId>),
}

impl Value {
    /// Returns true for [`Value::Null`]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string payload, if any
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the 32-bit integer payload, if any
    #[must_use]
    pub fn as_i4(&self) -> Option<i32> {
        match self {
            Value::I4(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the object payload, if any
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Returns the type payload, if any
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeRc> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// Returns the identifier payload, if any
    #[must_use]
    pub fn as_identifier(&self) -> Option<&Arc<AssembledTypeId>> {
        match self {
            Value::Identifier(id) => Some(id),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::I4(l), Value::I4(r)) => l == r,
            (Value::I8(l), Value::I8(r)) => l == r,
            (Value::R8(l), Value::R8(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Object(l), Value::Object(r)) => Arc::ptr_eq(l, r),
            (Value::Type(l), Value::Type(r)) => l.token == r.token,
            (Value::Identifier(l), Value::Identifier(r)) => l == r,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "Void"),
            Value::Null => write!(f, "Null"),
            Value::Boolean(v) => write!(f, "Boolean({v})"),
            Value::I4(v) => write!(f, "I4({v})"),
            Value::I8(v) => write!(f, "I8({v})"),
            Value::R8(v) => write!(f, "R8({v})"),
            Value::String(v) => write!(f, "String({v:?})"),
            Value::Object(o) => write!(f, "Object({})", o.runtime_type().fullname()),
            Value::Type(t) => write!(f, "Type({})", t.fullname()),
            Value::Identifier(id) => write!(f, "Identifier({id})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void | Value::Null => Ok(()),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::I4(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::R8(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Object(o) => write!(f, "{}", o.runtime_type().fullname()),
            Value::Type(t) => write!(f, "{}", t.fullname()),
            Value::Identifier(id) => write!(f, "{id}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I4(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I8(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::R8(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// An instance of a runtime type.
///
/// Storage for every instance field of the type and its base chain is allocated up front,
/// holding each field's default value until it is assigned.
pub struct Object {
    ty: TypeRc,
    fields: DashMap<Token, Value>,
}

impl Object {
    pub(crate) fn new(ty: &TypeRc) -> Self {
        let fields = DashMap::new();
        for field in ty.instance_fields() {
            fields.insert(field.token, field.signature.default_value());
        }

        Object {
            ty: ty.clone(),
            fields,
        }
    }

    /// The runtime type of this instance
    #[must_use]
    pub fn runtime_type(&self) -> &TypeRc {
        &self.ty
    }

    /// Reads an instance field by name
    ///
    /// # Errors
    /// Returns [`Error::MissingMember`] if no instance field with this name exists.
    pub fn get_field(&self, name: &str) -> Result<Value> {
        let field = self.named_field(name)?;
        self.load(&field)
    }

    /// Writes an instance field by name
    ///
    /// # Errors
    /// Returns [`Error::MissingMember`] if no instance field with this name exists, or
    /// [`Error::Argument`] if the value does not fit the field type.
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        let field = self.named_field(name)?;
        self.store(&field, value)
    }

    /// Calls an instance method by name, dispatching virtually.
    ///
    /// The most derived method with a matching name and arity is selected.
    ///
    /// # Errors
    /// Returns [`Error::MissingMember`] if no such method exists, or any error raised by
    /// the executed code.
    pub fn call(self: &Arc<Self>, name: &str, arguments: &[Value]) -> Result<Value> {
        let method = self
            .ty
            .lookup_method(name, arguments.len())
            .ok_or_else(|| Error::MissingMember {
                type_name: self.ty.fullname(),
                member: format!("{name}/{}", arguments.len()),
            })?;

        let target = self.ty.resolve_virtual(&method);
        Interpreter::new().invoke(&target, Some(self), arguments)
    }

    pub(crate) fn load(&self, field: &RuntimeField) -> Result<Value> {
        self.fields
            .get(&field.token)
            .map(|value| value.clone())
            .ok_or_else(|| Error::MissingMember {
                type_name: self.ty.fullname(),
                member: field.name.clone(),
            })
    }

    pub(crate) fn store(&self, field: &RuntimeField, value: Value) -> Result<()> {
        if !self.fields.contains_key(&field.token) {
            return Err(Error::MissingMember {
                type_name: self.ty.fullname(),
                member: field.name.clone(),
            });
        }
        if !field.signature.accepts(&value) {
            return Err(argument_error!(
                field.name,
                "value {:?} cannot be stored in a field of type {}",
                value,
                field.signature
            ));
        }

        self.fields.insert(field.token, value);
        Ok(())
    }

    fn named_field(&self, name: &str) -> Result<FieldRc> {
        self.ty
            .find_field(name)
            .filter(|field| !field.is_static())
            .ok_or_else(|| Error::MissingMember {
                type_name: self.ty.fullname(),
                member: name.to_string(),
            })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.ty.fullname())
            .field("fields", &self.fields.len())
            .finish()
    }
}
