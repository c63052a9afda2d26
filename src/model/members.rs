//! Member descriptors.

use crate::{
    model::{EventHandle, FieldHandle, MethodHandle, PropertyHandle},
    runtime::{
        CustomAttribute, EventAttributes, Expr, FieldAttributes, MethodAttributes, MethodKind,
        MethodRc, MethodSignature, PropertyAttributes, TypeSignature, Value,
    },
    Result,
};

/// A field added to a descriptor
#[derive(Debug, Clone)]
pub struct MutableField {
    pub(crate) handle: FieldHandle,
    pub(crate) name: String,
    pub(crate) signature: TypeSignature,
    pub(crate) flags: FieldAttributes,
    pub(crate) custom_attributes: Vec<CustomAttributeDeclaration>,
}

impl MutableField {
    /// Handle of this field
    pub fn handle(&self) -> FieldHandle {
        self.handle
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    /// Field flags
    pub fn flags(&self) -> FieldAttributes {
        self.flags
    }

    /// Returns true for static fields
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }

    /// Custom attributes applied to this field
    pub fn custom_attributes(&self) -> &[CustomAttributeDeclaration] {
        &self.custom_attributes
    }
}

/// A method, constructor or type initializer added to a descriptor
#[derive(Debug, Clone)]
pub struct MutableMethod {
    pub(crate) handle: MethodHandle,
    pub(crate) name: String,
    pub(crate) kind: MethodKind,
    pub(crate) flags: MethodAttributes,
    pub(crate) signature: MethodSignature,
    pub(crate) body: Option<Expr>,
    pub(crate) base_method: Option<MethodRc>,
    pub(crate) explicit_overrides: Vec<MethodRc>,
    pub(crate) custom_attributes: Vec<CustomAttributeDeclaration>,
}

impl MutableMethod {
    pub(crate) fn new(
        handle: MethodHandle,
        name: impl Into<String>,
        kind: MethodKind,
        flags: MethodAttributes,
        signature: MethodSignature,
        body: Option<Expr>,
    ) -> Self {
        MutableMethod {
            handle,
            name: name.into(),
            kind,
            flags,
            signature,
            body,
            base_method: None,
            explicit_overrides: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Handle of this method
    pub fn handle(&self) -> MethodHandle {
        self.handle
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method kind
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Method flags
    pub fn flags(&self) -> MethodAttributes {
        self.flags
    }

    /// Return and parameter types
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The current body; `None` for abstract methods
    pub fn body(&self) -> Option<&Expr> {
        self.body.as_ref()
    }

    /// Returns true for abstract methods
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    /// Returns true for static methods
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns true for virtual methods
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    /// The base method this method overrides, for override descriptors
    pub fn base_method(&self) -> Option<&MethodRc> {
        self.base_method.as_ref()
    }

    /// Interface or base methods this method implements explicitly
    pub fn explicit_overrides(&self) -> &[MethodRc] {
        &self.explicit_overrides
    }

    /// Custom attributes applied to this method
    pub fn custom_attributes(&self) -> &[CustomAttributeDeclaration] {
        &self.custom_attributes
    }
}

/// A property added to a descriptor
#[derive(Debug, Clone)]
pub struct MutableProperty {
    pub(crate) handle: PropertyHandle,
    pub(crate) name: String,
    pub(crate) signature: TypeSignature,
    pub(crate) flags: PropertyAttributes,
    pub(crate) getter: Option<MethodHandle>,
    pub(crate) setter: Option<MethodHandle>,
}

impl MutableProperty {
    /// Handle of this property
    pub fn handle(&self) -> PropertyHandle {
        self.handle
    }

    /// Property name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Property type
    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    /// The get accessor
    pub fn getter(&self) -> Option<MethodHandle> {
        self.getter
    }

    /// The set accessor
    pub fn setter(&self) -> Option<MethodHandle> {
        self.setter
    }
}

/// An event added to a descriptor
#[derive(Debug, Clone)]
pub struct MutableEvent {
    pub(crate) handle: EventHandle,
    pub(crate) name: String,
    pub(crate) event_type: TypeSignature,
    pub(crate) flags: EventAttributes,
    pub(crate) add_method: MethodHandle,
    pub(crate) remove_method: MethodHandle,
    pub(crate) raise_method: Option<MethodHandle>,
}

impl MutableEvent {
    /// Handle of this event
    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    /// Event name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler type
    pub fn event_type(&self) -> &TypeSignature {
        &self.event_type
    }

    /// The add accessor
    pub fn add_method(&self) -> MethodHandle {
        self.add_method
    }

    /// The remove accessor
    pub fn remove_method(&self) -> MethodHandle {
        self.remove_method
    }

    /// The raise method, if any
    pub fn raise_method(&self) -> Option<MethodHandle> {
        self.raise_method
    }
}

/// A validated custom attribute application
#[derive(Debug, Clone)]
pub struct CustomAttributeDeclaration {
    constructor: MethodRc,
    arguments: Vec<Value>,
    named_arguments: Vec<(String, Value)>,
}

impl CustomAttributeDeclaration {
    /// Declares an attribute application.
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if `constructor` is not a constructor of a concrete
    /// attribute type, if the arguments do not match its parameters, or if a named argument
    /// does not refer to a public instance field of the attribute type.
    pub fn new(
        constructor: &MethodRc,
        arguments: Vec<Value>,
        named_arguments: Vec<(String, Value)>,
    ) -> Result<Self> {
        if !constructor.is_constructor() {
            return Err(argument_error!(
                "constructor",
                "'{}' is not a constructor",
                constructor.full_name()
            ));
        }
        let Some(attribute_type) = constructor.declaring_type() else {
            return Err(argument_error!("constructor", "declaring type has been dropped"));
        };
        let is_attribute = attribute_type
            .hierarchy()
            .iter()
            .any(|ty| ty.fullname() == "System.Attribute");
        if !is_attribute {
            return Err(argument_error!(
                "constructor",
                "'{}' does not derive from System.Attribute",
                attribute_type.fullname()
            ));
        }
        if attribute_type.is_abstract() {
            return Err(argument_error!(
                "constructor",
                "attribute type '{}' is abstract",
                attribute_type.fullname()
            ));
        }
        if constructor.signature.arity() != arguments.len() {
            return Err(argument_error!(
                "arguments",
                "'{}' expects {} arguments, {} were supplied",
                constructor.full_name(),
                constructor.signature.arity(),
                arguments.len()
            ));
        }
        for (parameter, argument) in constructor.signature.parameters.iter().zip(&arguments) {
            if !parameter.ty.accepts(argument) {
                return Err(argument_error!(
                    parameter.name,
                    "value {:?} does not match parameter type {}",
                    argument,
                    parameter.ty
                ));
            }
        }
        for (name, value) in &named_arguments {
            let field = attribute_type
                .find_field(name)
                .filter(|field| !field.is_static());
            match field {
                Some(field) if field.signature.accepts(value) => {}
                Some(field) => {
                    return Err(argument_error!(
                        name,
                        "value {:?} does not match field type {}",
                        value,
                        field.signature
                    ))
                }
                None => {
                    return Err(argument_error!(
                        name,
                        "'{}' has no instance field with this name",
                        attribute_type.fullname()
                    ))
                }
            }
        }

        Ok(CustomAttributeDeclaration {
            constructor: constructor.clone(),
            arguments,
            named_arguments,
        })
    }

    /// The attribute constructor
    pub fn constructor(&self) -> &MethodRc {
        &self.constructor
    }

    /// Positional arguments
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Named field arguments
    pub fn named_arguments(&self) -> &[(String, Value)] {
        &self.named_arguments
    }

    pub(crate) fn to_runtime(&self) -> CustomAttribute {
        CustomAttribute {
            constructor: self.constructor.clone(),
            arguments: self.arguments.clone(),
            named_arguments: self.named_arguments.clone(),
        }
    }
}
