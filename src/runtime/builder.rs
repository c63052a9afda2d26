//! Builder for hand-written runtime types.
//!
//! This module provides [`ClassBuilder`], a fluent API for describing the types an application
//! asks the pipeline to assemble (classes, abstract classes and interfaces with fields,
//! constructors, methods and auto-properties). Method bodies may refer to members of the type
//! being built through [`MethodBuilder::body_with`], which runs after all members exist.
//!
//! # Example
//!
//! ```rust
//! use typeforge::runtime::{ClassBuilder, Expr, TypeRegistry, TypeSignature};
//!
//! let registry = TypeRegistry::new()?;
//! let base = ClassBuilder::new("App", "Base")
//!     .public()
//!     .default_constructor()
//!     .auto_property("Name", TypeSignature::String)
//!     .method("Describe", |m| {
//!         m.virtual_()
//!             .returns(TypeSignature::String)
//!             .body(Expr::constant("base"))
//!     })
//!     .build(&registry)?;
//! assert_eq!(base.fullname(), "App.Base");
//! # Ok::<(), typeforge::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    runtime::{
        registry::TokenAllocator, CustomAttribute, Expr, FieldAttributes, MemberAccess,
        MethodAttributes, MethodKind, MethodRc, MethodSignature, ParameterDeclaration,
        PropertyAttributes, RuntimeField, RuntimeMethod, RuntimeProperty, RuntimeType,
        TokenKind, TypeAttributes, TypeOrigin, TypeRc, TypeRef, TypeRegistry, TypeSignature,
        Value,
    },
    Result,
};

type DeferredBody = Box<dyn FnOnce(&TypeRc) -> Result<Expr>>;

enum BodySource {
    Missing,
    Fixed(Expr),
    Deferred(DeferredBody),
}

/// Fluent description of one method, constructor or type initializer
pub struct MethodBuilder {
    flags: MethodAttributes,
    return_type: TypeSignature,
    parameters: Vec<ParameterDeclaration>,
    body: BodySource,
}

impl MethodBuilder {
    fn new() -> Self {
        MethodBuilder {
            flags: MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            return_type: TypeSignature::Void,
            parameters: Vec::new(),
            body: BodySource::Missing,
        }
    }

    fn access(mut self, access: MemberAccess) -> Self {
        self.flags = self.flags.with_access(access);
        self
    }

    /// Public access (the default)
    #[must_use]
    pub fn public(self) -> Self {
        self.access(MemberAccess::Public)
    }

    /// Family (protected) access
    #[must_use]
    pub fn protected(self) -> Self {
        self.access(MemberAccess::Family)
    }

    /// Private access
    #[must_use]
    pub fn private(self) -> Self {
        self.access(MemberAccess::Private)
    }

    /// Assembly (internal) access
    #[must_use]
    pub fn internal(self) -> Self {
        self.access(MemberAccess::Assembly)
    }

    /// Introduces a new virtual slot
    #[must_use]
    pub fn virtual_(mut self) -> Self {
        self.flags |= MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT;
        self
    }

    /// Overrides the base method with the same name and signature
    #[must_use]
    pub fn override_(mut self) -> Self {
        self.flags |= MethodAttributes::VIRTUAL;
        self.flags.remove(MethodAttributes::NEW_SLOT);
        self
    }

    /// Abstract virtual method without body
    #[must_use]
    pub fn abstract_(mut self) -> Self {
        self.flags |=
            MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT;
        self
    }

    /// Prevents further overriding
    #[must_use]
    pub fn final_(mut self) -> Self {
        self.flags |= MethodAttributes::FINAL;
        self
    }

    /// Sets the return type
    #[must_use]
    pub fn returns(mut self, return_type: TypeSignature) -> Self {
        self.return_type = return_type;
        self
    }

    /// Appends a parameter
    #[must_use]
    pub fn parameter(mut self, name: &str, ty: TypeSignature) -> Self {
        self.parameters.push(ParameterDeclaration::new(name, ty));
        self
    }

    /// Sets a body that does not reference the type being built
    #[must_use]
    pub fn body(mut self, body: Expr) -> Self {
        self.body = BodySource::Fixed(body);
        self
    }

    /// Sets a body computed from the finished member list of the type being built
    #[must_use]
    pub fn body_with<F>(mut self, body: F) -> Self
    where
        F: FnOnce(&TypeRc) -> Result<Expr> + 'static,
    {
        self.body = BodySource::Deferred(Box::new(body));
        self
    }

    fn signature(&self) -> MethodSignature {
        MethodSignature::with_parameters(self.return_type.clone(), self.parameters.clone())
    }
}

struct FieldDefinition {
    name: String,
    signature: TypeSignature,
    flags: FieldAttributes,
}

struct MethodDefinition {
    name: String,
    kind: MethodKind,
    builder: MethodBuilder,
}

/// Provides a fluent API for building hand-written classes and interfaces
pub struct ClassBuilder {
    namespace: String,
    name: String,
    flags: TypeAttributes,
    base: Option<TypeRc>,
    declaring: Option<TypeRc>,
    interfaces: Vec<TypeRc>,
    fields: Vec<FieldDefinition>,
    methods: Vec<MethodDefinition>,
    type_initializer: Option<DeferredBody>,
    properties: Vec<(String, TypeSignature)>,
    attributes: Vec<(MethodRc, Vec<Value>)>,
}

impl ClassBuilder {
    /// Starts a non-public class deriving from `System.Object`
    pub fn new(namespace: &str, name: &str) -> Self {
        ClassBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags: TypeAttributes::NOT_PUBLIC,
            base: None,
            declaring: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            type_initializer: None,
            properties: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Public visibility
    #[must_use]
    pub fn public(mut self) -> Self {
        let visibility = if self.declaring.is_some() {
            TypeAttributes::NESTED_PUBLIC
        } else {
            TypeAttributes::PUBLIC
        };
        self.flags = TypeAttributes::from_bits_retain(self.flags.bits() & !0x7) | visibility;
        self
    }

    /// Sealed class
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.flags |= TypeAttributes::SEALED;
        self
    }

    /// Abstract class
    #[must_use]
    pub fn abstract_(mut self) -> Self {
        self.flags |= TypeAttributes::ABSTRACT;
        self
    }

    /// Interface instead of class
    #[must_use]
    pub fn interface(mut self) -> Self {
        self.flags |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        self
    }

    /// Nests the type inside `outer` with public nested visibility
    #[must_use]
    pub fn nested_in(mut self, outer: &TypeRc) -> Self {
        self.declaring = Some(outer.clone());
        self.flags =
            TypeAttributes::from_bits_retain(self.flags.bits() & !0x7) | TypeAttributes::NESTED_PUBLIC;
        self
    }

    /// Base class, `System.Object` if not called
    #[must_use]
    pub fn extends(mut self, base: &TypeRc) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Implements an interface
    #[must_use]
    pub fn implements(mut self, interface: &TypeRc) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// Public instance field
    #[must_use]
    pub fn field(mut self, name: &str, signature: TypeSignature) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            signature,
            flags: FieldAttributes::PUBLIC,
        });
        self
    }

    /// Public static field
    #[must_use]
    pub fn static_field(mut self, name: &str, signature: TypeSignature) -> Self {
        self.fields.push(FieldDefinition {
            name: name.to_string(),
            signature,
            flags: FieldAttributes::PUBLIC | FieldAttributes::STATIC,
        });
        self
    }

    /// Public parameterless constructor calling the parameterless base constructor
    #[must_use]
    pub fn default_constructor(self) -> Self {
        self.constructor(|ctor| ctor)
    }

    /// Instance constructor; without explicit body it calls the parameterless base constructor
    #[must_use]
    pub fn constructor<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(MethodBuilder) -> MethodBuilder,
    {
        self.methods.push(MethodDefinition {
            name: ".ctor".to_string(),
            kind: MethodKind::Constructor,
            builder: configure(MethodBuilder::new()),
        });
        self
    }

    /// Static type initializer
    #[must_use]
    pub fn type_initializer<F>(mut self, body: F) -> Self
    where
        F: FnOnce(&TypeRc) -> Result<Expr> + 'static,
    {
        self.type_initializer = Some(Box::new(body));
        self
    }

    /// Instance method
    #[must_use]
    pub fn method<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MethodBuilder) -> MethodBuilder,
    {
        self.methods.push(MethodDefinition {
            name: name.to_string(),
            kind: MethodKind::Method,
            builder: configure(MethodBuilder::new()),
        });
        self
    }

    /// Static method
    #[must_use]
    pub fn static_method<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MethodBuilder) -> MethodBuilder,
    {
        let mut builder = configure(MethodBuilder::new());
        builder.flags |= MethodAttributes::STATIC;
        self.methods.push(MethodDefinition {
            name: name.to_string(),
            kind: MethodKind::Method,
            builder,
        });
        self
    }

    /// Property with a private backing field and public `get_`/`set_` accessors
    #[must_use]
    pub fn auto_property(mut self, name: &str, signature: TypeSignature) -> Self {
        self.properties.push((name.to_string(), signature));
        self
    }

    /// Applies a custom attribute
    #[must_use]
    pub fn custom_attribute(mut self, constructor: &MethodRc, arguments: Vec<Value>) -> Self {
        self.attributes.push((constructor.clone(), arguments));
        self
    }

    /// Creates the type and registers it in `registry`
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for invalid base types or interfaces and
    /// [`crate::Error::InvalidOperation`] for methods without body.
    pub fn build(self, registry: &TypeRegistry) -> Result<TypeRc> {
        let default_base = registry.core().object.clone();
        let ty = self.build_with(registry.tokens(), Some(&default_base))?;
        registry.insert(&ty);
        Ok(ty)
    }

    pub(crate) fn build_with(
        mut self,
        tokens: &TokenAllocator,
        default_base: Option<&TypeRc>,
    ) -> Result<TypeRc> {
        let is_interface = self.flags.contains(TypeAttributes::INTERFACE);
        let ty = Arc::new(RuntimeType::new(
            tokens.next(TokenKind::Type),
            if self.declaring.is_some() {
                String::new()
            } else {
                self.namespace.clone()
            },
            self.name.clone(),
            self.flags,
            TypeOrigin::Native,
        ));

        if !is_interface {
            if let Some(base) = self.base.take().or_else(|| default_base.cloned()) {
                if base.is_sealed() || base.is_interface() {
                    return Err(argument_error!(
                        "base",
                        "'{}' cannot be used as base type of '{}'",
                        base.fullname(),
                        self.name
                    ));
                }
                ty.set_base(base)?;
            }
        }
        if let Some(outer) = &self.declaring {
            ty.set_declaring_type(outer)?;
            outer.nested_types.push(TypeRef::new(&ty));
        }
        for interface in &self.interfaces {
            if !interface.is_interface() {
                return Err(argument_error!(
                    "interface",
                    "'{}' is not an interface",
                    interface.fullname()
                ));
            }
            ty.interfaces.push(interface.clone());
        }

        for field in self.fields.drain(..) {
            ty.fields.push(Arc::new(RuntimeField::new(
                tokens.next(TokenKind::Field),
                field.name,
                &ty,
                field.signature,
                field.flags,
            )));
        }

        let mut pending = Vec::new();
        for (name, signature) in self.properties.drain(..) {
            pending.extend(Self::define_auto_property(&ty, tokens, &name, signature));
        }

        for definition in self.methods.drain(..) {
            let signature = definition.builder.signature();
            let mut flags = definition.builder.flags;
            if definition.kind == MethodKind::Constructor {
                flags |= MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME;
            }
            let method = Arc::new(RuntimeMethod::new(
                tokens.next(TokenKind::Method),
                definition.name,
                &ty,
                definition.kind,
                flags,
                signature,
            ));
            match definition.kind {
                MethodKind::Constructor => ty.constructors.push(method.clone()),
                _ => ty.methods.push(method.clone()),
            };
            pending.push((method, definition.builder.body));
        }

        if let Some(body) = self.type_initializer.take() {
            let initializer = Arc::new(RuntimeMethod::new(
                tokens.next(TokenKind::Method),
                ".cctor",
                &ty,
                MethodKind::TypeInitializer,
                MethodAttributes::PRIVATE
                    | MethodAttributes::STATIC
                    | MethodAttributes::SPECIAL_NAME
                    | MethodAttributes::RT_SPECIAL_NAME,
                MethodSignature::void(),
            ));
            ty.set_type_initializer(initializer.clone())?;
            pending.push((initializer, BodySource::Deferred(body)));
        }

        for (method, body) in pending {
            let body = match body {
                BodySource::Fixed(body) => Some(body),
                BodySource::Deferred(body) => Some(body(&ty)?),
                BodySource::Missing if method.is_abstract() => None,
                BodySource::Missing if method.is_constructor() => {
                    Some(Self::base_constructor_call(&ty)?)
                }
                BodySource::Missing => {
                    return Err(invalid_operation!(
                        "Method '{}' has no body",
                        method.full_name()
                    ))
                }
            };
            if let Some(body) = body {
                method.set_body(body)?;
            }
        }

        for (constructor, arguments) in self.attributes.drain(..) {
            ty.custom_attributes.push(CustomAttribute {
                constructor,
                arguments,
                named_arguments: Vec::new(),
            });
        }

        ty.mark_complete();
        Ok(ty)
    }

    fn base_constructor_call(ty: &TypeRc) -> Result<Expr> {
        let Some(base) = ty.base() else {
            return Ok(Expr::empty());
        };
        let constructor = base.find_constructor(&[]).ok_or_else(|| {
            invalid_operation!(
                "Base type '{}' of '{}' has no parameterless constructor",
                base.fullname(),
                ty.fullname()
            )
        })?;
        Ok(Expr::call_base(Expr::This, &constructor, Vec::new()))
    }

    fn define_auto_property(
        ty: &TypeRc,
        tokens: &TokenAllocator,
        name: &str,
        signature: TypeSignature,
    ) -> Vec<(MethodRc, BodySource)> {
        let backing = Arc::new(RuntimeField::new(
            tokens.next(TokenKind::Field),
            format!("<{name}>k__BackingField"),
            ty,
            signature.clone(),
            FieldAttributes::PRIVATE,
        ));
        ty.fields.push(backing.clone());

        let accessor_flags =
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG | MethodAttributes::SPECIAL_NAME;
        let getter = Arc::new(RuntimeMethod::new(
            tokens.next(TokenKind::Method),
            format!("get_{name}"),
            ty,
            MethodKind::Method,
            accessor_flags,
            MethodSignature::new(signature.clone(), Vec::new()),
        ));
        let setter = Arc::new(RuntimeMethod::new(
            tokens.next(TokenKind::Method),
            format!("set_{name}"),
            ty,
            MethodKind::Method,
            accessor_flags,
            MethodSignature::with_parameters(
                TypeSignature::Void,
                vec![ParameterDeclaration::new("value", signature.clone())],
            ),
        ));
        ty.methods.push(getter.clone());
        ty.methods.push(setter.clone());
        ty.properties.push(Arc::new(RuntimeProperty::new(
            tokens.next(TokenKind::Property),
            name,
            ty,
            signature,
            PropertyAttributes::empty(),
            Some(getter.clone()),
            Some(setter.clone()),
        )));

        vec![
            (getter, BodySource::Fixed(Expr::load_this_field(&backing))),
            (
                setter,
                BodySource::Fixed(Expr::store_this_field(&backing, Expr::Argument(0))),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::fixtures::registry, Error};

    #[test]
    fn test_auto_property_round_trip() {
        let registry = registry();
        let person = ClassBuilder::new("App", "Person")
            .public()
            .default_constructor()
            .auto_property("Name", TypeSignature::String)
            .build(&registry)
            .unwrap();

        let instance = person.create_instance(&[]).unwrap();
        instance.call("set_Name", &[Value::from("Ada")]).unwrap();
        assert_eq!(instance.call("get_Name", &[]).unwrap(), Value::from("Ada"));
        assert_eq!(person.properties.count(), 1);
    }

    #[test]
    fn test_sealed_base_rejected() {
        let registry = registry();
        let sealed = ClassBuilder::new("App", "Sealed")
            .public()
            .sealed()
            .build(&registry)
            .unwrap();

        let result = ClassBuilder::new("App", "Derived")
            .extends(&sealed)
            .build(&registry);
        assert!(matches!(result, Err(Error::Argument { .. })));
    }

    #[test]
    fn test_method_without_body_rejected() {
        let registry = registry();
        let result = ClassBuilder::new("App", "Broken")
            .method("Run", |m| m.returns(TypeSignature::I4))
            .build(&registry);
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_constructor_with_parameters() {
        let registry = registry();
        let point = ClassBuilder::new("App", "Point")
            .public()
            .field("X", TypeSignature::I4)
            .constructor(|c| {
                c.parameter("x", TypeSignature::I4).body_with(|ty| {
                    let object_ctor = ty.base().unwrap().constructor_list().remove(0);
                    Ok(Expr::Block(vec![
                        Expr::call_base(Expr::This, &object_ctor, Vec::new()),
                        Expr::store_this_field(&ty.field("X")?, Expr::Argument(0)),
                    ]))
                })
            })
            .build(&registry)
            .unwrap();

        let instance = point.create_instance(&[Value::I4(7)]).unwrap();
        assert_eq!(instance.get_field("X").unwrap(), Value::I4(7));
        assert!(point.create_instance(&[]).is_err());
    }
}
