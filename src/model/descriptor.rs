//! The mutable type descriptor.
//!
//! A [`MutableType`] records the structural edits participants make to one generated type.
//! Every mutator validates eagerly and appends; nothing is ever removed. Once the batch is
//! handed to the code generator the descriptor is sealed and all mutators fail with
//! [`crate::Error::DescriptorSealed`].

use std::{cell::Cell, collections::HashMap};

use crate::{
    model::{
        handles::to_index, CustomAttributeDeclaration, EventHandle, FieldHandle, MethodHandle,
        MethodSlot, MutableEvent, MutableField, MutableMethod, MutableProperty, PropertyHandle,
        TypeHandle,
    },
    runtime::{
        EventAttributes, Expr, FieldAttributes, MemberAccess, MethodAttributes, MethodKind,
        MethodRc, MethodSignature, ParameterDeclaration, PropertyAttributes, Token,
        TypeAttributes, TypeRc, TypeSignature,
    },
    Error, Result,
};

/// Descriptor of one type generated in a batch
pub struct MutableType {
    pub(crate) handle: TypeHandle,
    pub(crate) namespace: String,
    pub(crate) name: String,
    pub(crate) flags: TypeAttributes,
    pub(crate) base: Option<TypeSignature>,
    pub(crate) declaring: Option<TypeHandle>,
    pub(crate) requested: Option<TypeRc>,
    pub(crate) interfaces: Vec<TypeSignature>,
    pub(crate) fields: Vec<MutableField>,
    pub(crate) constructors: Vec<MutableMethod>,
    pub(crate) type_initializer: Option<MutableMethod>,
    pub(crate) methods: Vec<MutableMethod>,
    pub(crate) properties: Vec<MutableProperty>,
    pub(crate) events: Vec<MutableEvent>,
    pub(crate) nested_types: Vec<TypeHandle>,
    pub(crate) custom_attributes: Vec<CustomAttributeDeclaration>,
    pub(crate) initializations: Vec<Expr>,
    pub(crate) type_initializations: Vec<Expr>,
    /// Override descriptors keyed by the slot root of the overridden chain
    overrides: HashMap<Token, MethodHandle>,
    /// Implementation descriptors keyed by interface method
    implementations: HashMap<Token, MethodHandle>,
    abstract_cache: Cell<Option<bool>>,
    modified: bool,
    sealed: bool,
}

impl MutableType {
    pub(crate) fn new(
        handle: TypeHandle,
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
        base: Option<TypeSignature>,
    ) -> Self {
        MutableType {
            handle,
            namespace: namespace.into(),
            name: name.into(),
            flags,
            base,
            declaring: None,
            requested: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            type_initializer: None,
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested_types: Vec::new(),
            custom_attributes: Vec::new(),
            initializations: Vec::new(),
            type_initializations: Vec::new(),
            overrides: HashMap::new(),
            implementations: HashMap::new(),
            abstract_cache: Cell::new(None),
            modified: false,
            sealed: false,
        }
    }

    /// Creates the proxy descriptor for `requested`.
    ///
    /// Every constructor a subclass can call is copied as a constructor forwarding to it;
    /// the copies do not count as a modification.
    pub(crate) fn new_proxy(handle: TypeHandle, requested: &TypeRc, name: impl Into<String>) -> Self {
        let mut proxy = MutableType::new(
            handle,
            requested.namespace.clone(),
            name,
            TypeAttributes::PUBLIC | TypeAttributes::BEFORE_FIELD_INIT,
            Some(TypeSignature::class(requested)),
        );
        proxy.requested = Some(requested.clone());

        for ctor in requested.constructor_list() {
            let access = match ctor.access() {
                MemberAccess::FamilyOrAssembly => MemberAccess::Family,
                access if access.is_accessible_from_subclass() => access,
                _ => continue,
            };
            let flags = (MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME)
                .with_access(access);
            let body = Expr::call_base(
                Expr::This,
                &ctor,
                Expr::forward_arguments(ctor.signature.arity()),
            );
            let handle = MethodHandle {
                owner: handle,
                slot: MethodSlot::Constructor(to_index(proxy.constructors.len())),
            };
            proxy.constructors.push(MutableMethod::new(
                handle,
                ".ctor",
                MethodKind::Constructor,
                flags,
                ctor.signature.clone(),
                Some(body),
            ));
        }
        proxy
    }

    /// Handle of this descriptor
    pub fn handle(&self) -> TypeHandle {
        self.handle
    }

    /// Namespace (empty for nested descriptors)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Namespace.Name`; use [`crate::model::TypeArena::fullname`] for nested descriptors
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Type flags
    pub fn flags(&self) -> TypeAttributes {
        self.flags
    }

    /// Base type; `None` means `System.Object` (or no base for interfaces)
    pub fn base(&self) -> Option<&TypeSignature> {
        self.base.as_ref()
    }

    /// The base type if it is a runtime type
    pub fn base_runtime_type(&self) -> Option<TypeRc> {
        self.base.as_ref().and_then(TypeSignature::runtime_type)
    }

    /// Enclosing descriptor of a nested descriptor
    pub fn declaring_type(&self) -> Option<TypeHandle> {
        self.declaring
    }

    /// The requested type, for proxy descriptors
    pub fn requested_type(&self) -> Option<&TypeRc> {
        self.requested.as_ref()
    }

    /// Returns true for interface descriptors
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[TypeSignature] {
        &self.interfaces
    }

    /// Added fields
    pub fn fields(&self) -> &[MutableField] {
        &self.fields
    }

    /// Added instance constructors
    pub fn constructors(&self) -> &[MutableMethod] {
        &self.constructors
    }

    /// The type initializer, if one was added
    pub fn type_initializer(&self) -> Option<&MutableMethod> {
        self.type_initializer.as_ref()
    }

    /// Added methods, including accessors and override descriptors
    pub fn methods(&self) -> &[MutableMethod] {
        &self.methods
    }

    /// Added properties
    pub fn properties(&self) -> &[MutableProperty] {
        &self.properties
    }

    /// Added events
    pub fn events(&self) -> &[MutableEvent] {
        &self.events
    }

    /// Nested descriptors
    pub fn nested_types(&self) -> &[TypeHandle] {
        &self.nested_types
    }

    /// Custom attributes applied to the type
    pub fn custom_attributes(&self) -> &[CustomAttributeDeclaration] {
        &self.custom_attributes
    }

    /// Expressions prepended to every instance constructor
    pub fn initializations(&self) -> &[Expr] {
        &self.initializations
    }

    /// Expressions prepended to the type initializer
    pub fn type_initializations(&self) -> &[Expr] {
        &self.type_initializations
    }

    /// Returns true once any structural change has been recorded
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Returns true once the descriptor has been handed to the code generator
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Looks up a field descriptor
    pub fn field(&self, handle: FieldHandle) -> Option<&MutableField> {
        if handle.owner != self.handle {
            return None;
        }
        self.fields.get(handle.index as usize)
    }

    /// Looks up a method, constructor or type initializer descriptor
    pub fn method(&self, handle: MethodHandle) -> Option<&MutableMethod> {
        if handle.owner != self.handle {
            return None;
        }
        match handle.slot {
            MethodSlot::Method(index) => self.methods.get(index as usize),
            MethodSlot::Constructor(index) => self.constructors.get(index as usize),
            MethodSlot::TypeInitializer => self.type_initializer.as_ref(),
        }
    }

    fn method_mut(&mut self, handle: MethodHandle) -> Option<&mut MutableMethod> {
        if handle.owner != self.handle {
            return None;
        }
        match handle.slot {
            MethodSlot::Method(index) => self.methods.get_mut(index as usize),
            MethodSlot::Constructor(index) => self.constructors.get_mut(index as usize),
            MethodSlot::TypeInitializer => self.type_initializer.as_mut(),
        }
    }

    /// Looks up a property descriptor
    pub fn property(&self, handle: PropertyHandle) -> Option<&MutableProperty> {
        if handle.owner != self.handle {
            return None;
        }
        self.properties.get(handle.index as usize)
    }

    /// Looks up an event descriptor
    pub fn event(&self, handle: EventHandle) -> Option<&MutableEvent> {
        if handle.owner != self.handle {
            return None;
        }
        self.events.get(handle.index as usize)
    }

    /// Finds an added method by name
    pub fn find_method(&self, name: &str) -> Option<&MutableMethod> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Finds an added field by name
    pub fn find_field(&self, name: &str) -> Option<&MutableField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.sealed {
            return Err(Error::DescriptorSealed(self.fullname()));
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.modified = true;
        self.abstract_cache.set(None);
    }

    fn duplicate(&self, kind: &'static str, name: &str) -> Error {
        Error::DuplicateMember {
            kind,
            name: name.to_string(),
            type_name: self.fullname(),
        }
    }

    /// Adds a field.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] for void or unnamed fields and instance fields on
    /// interfaces, [`Error::DuplicateMember`] if a field with the same name exists.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        signature: TypeSignature,
        flags: FieldAttributes,
    ) -> Result<FieldHandle> {
        self.ensure_mutable()?;
        let name = name.into();
        if name.is_empty() {
            return Err(argument_error!("name", "Field name must not be empty"));
        }
        if signature.is_void() {
            return Err(argument_error!(
                "signature",
                "Field '{}' cannot be of type void",
                name
            ));
        }
        if self.is_interface() && !flags.contains(FieldAttributes::STATIC) {
            return Err(argument_error!(
                "flags",
                "Interface '{}' cannot declare instance field '{}'",
                self.fullname(),
                name
            ));
        }
        if self.find_field(&name).is_some() {
            return Err(self.duplicate("field", &name));
        }

        let handle = FieldHandle {
            owner: self.handle,
            index: to_index(self.fields.len()),
        };
        self.fields.push(MutableField {
            handle,
            name,
            signature,
            flags,
            custom_attributes: Vec::new(),
        });
        self.touch();
        Ok(handle)
    }

    /// Adds an instance constructor.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] for static, virtual or abstract constructor flags,
    /// [`Error::InvalidOperation`] for interfaces and [`Error::DuplicateMember`] if a
    /// constructor with the same parameter types exists.
    pub fn add_constructor(
        &mut self,
        flags: MethodAttributes,
        parameters: Vec<ParameterDeclaration>,
        body: Expr,
    ) -> Result<MethodHandle> {
        self.ensure_mutable()?;
        if flags.contains(MethodAttributes::STATIC) {
            return Err(argument_error!(
                "flags",
                "Static constructors are added through add_type_initializer"
            ));
        }
        if flags.intersects(MethodAttributes::VIRTUAL | MethodAttributes::ABSTRACT) {
            return Err(argument_error!(
                "flags",
                "Constructors cannot be virtual or abstract"
            ));
        }
        if self.is_interface() {
            return Err(invalid_operation!(
                "Interface '{}' cannot declare constructors",
                self.fullname()
            ));
        }

        let signature = MethodSignature::with_parameters(TypeSignature::Void, parameters);
        if self
            .constructors
            .iter()
            .any(|ctor| ctor.signature.has_parameter_types(&signature))
        {
            return Err(self.duplicate("constructor", ".ctor"));
        }

        let handle = MethodHandle {
            owner: self.handle,
            slot: MethodSlot::Constructor(to_index(self.constructors.len())),
        };
        self.constructors.push(MutableMethod::new(
            handle,
            ".ctor",
            MethodKind::Constructor,
            flags | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME,
            signature,
            Some(body),
        ));
        self.touch();
        Ok(handle)
    }

    /// Adds the type initializer.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if the descriptor already has one.
    pub fn add_type_initializer(&mut self, body: Expr) -> Result<MethodHandle> {
        self.ensure_mutable()?;
        if self.type_initializer.is_some() {
            return Err(invalid_operation!(
                "Type '{}' already has a type initializer",
                self.fullname()
            ));
        }

        let handle = MethodHandle {
            owner: self.handle,
            slot: MethodSlot::TypeInitializer,
        };
        self.type_initializer = Some(MutableMethod::new(
            handle,
            ".cctor",
            MethodKind::TypeInitializer,
            MethodAttributes::PRIVATE
                | MethodAttributes::STATIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            MethodSignature::void(),
            Some(body),
        ));
        self.touch();
        Ok(handle)
    }

    /// Adds an expression executed at the start of the type initializer; a type initializer
    /// is generated if none was added.
    ///
    /// # Errors
    /// Returns [`Error::DescriptorSealed`] once the descriptor is sealed.
    pub fn add_type_initialization(&mut self, expression: Expr) -> Result<()> {
        self.ensure_mutable()?;
        self.type_initializations.push(expression);
        self.touch();
        Ok(())
    }

    /// Adds an expression executed at the start of every instance constructor.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] for interfaces.
    pub fn add_initialization(&mut self, expression: Expr) -> Result<()> {
        self.ensure_mutable()?;
        if self.is_interface() {
            return Err(invalid_operation!(
                "Interface '{}' has no instance constructors",
                self.fullname()
            ));
        }
        self.initializations.push(expression);
        self.touch();
        Ok(())
    }

    /// Adds a method.
    ///
    /// Abstract methods must be virtual and have no body; all other methods need one.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] for inconsistent flags, bodies or parameter types, and
    /// [`Error::DuplicateMember`] if a method with the same name and parameter types exists.
    pub fn add_method(
        &mut self,
        name: impl Into<String>,
        flags: MethodAttributes,
        signature: MethodSignature,
        body: Option<Expr>,
    ) -> Result<MethodHandle> {
        self.ensure_mutable()?;
        let name = name.into();
        self.validate_method(&name, flags, &signature, body.is_some())?;

        let handle = MethodHandle {
            owner: self.handle,
            slot: MethodSlot::Method(to_index(self.methods.len())),
        };
        self.methods.push(MutableMethod::new(
            handle,
            name,
            MethodKind::Method,
            flags,
            signature,
            body,
        ));
        self.touch();
        Ok(handle)
    }

    fn validate_method(
        &self,
        name: &str,
        flags: MethodAttributes,
        signature: &MethodSignature,
        has_body: bool,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(argument_error!("name", "Method name must not be empty"));
        }
        let is_abstract = flags.contains(MethodAttributes::ABSTRACT);
        let is_virtual = flags.contains(MethodAttributes::VIRTUAL);
        let is_static = flags.contains(MethodAttributes::STATIC);
        if is_abstract && !is_virtual {
            return Err(argument_error!(
                "flags",
                "Abstract method '{}' must also be virtual",
                name
            ));
        }
        if is_abstract && has_body {
            return Err(argument_error!(
                "body",
                "Abstract method '{}' cannot have a body",
                name
            ));
        }
        if !is_abstract && !has_body {
            return Err(argument_error!("body", "Method '{}' requires a body", name));
        }
        if is_static && is_virtual {
            return Err(argument_error!(
                "flags",
                "Static method '{}' cannot be virtual",
                name
            ));
        }
        if self.is_interface() && !is_static && !is_abstract {
            return Err(argument_error!(
                "flags",
                "Instance method '{}' of interface '{}' must be abstract",
                name,
                self.fullname()
            ));
        }
        if signature.parameters.iter().any(|p| p.ty.is_void()) {
            return Err(argument_error!(
                "signature",
                "Parameters of '{}' cannot be of type void",
                name
            ));
        }
        if self
            .methods
            .iter()
            .any(|method| method.name == name && method.signature.has_parameter_types(signature))
        {
            return Err(self.duplicate("method", name));
        }
        Ok(())
    }

    /// Replaces the body of an added method, constructor or type initializer. Abstract
    /// methods become concrete.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `handle` does not belong to this descriptor and
    /// [`Error::InvalidOperation`] for interface methods.
    pub fn set_method_body(&mut self, handle: MethodHandle, body: Expr) -> Result<()> {
        self.ensure_mutable()?;
        let is_interface = self.is_interface();
        let type_name = self.fullname();
        let method = self.method_mut(handle).ok_or_else(|| {
            argument_error!("handle", "Method does not belong to '{}'", type_name)
        })?;
        if is_interface && !method.is_static() {
            return Err(invalid_operation!(
                "Interface method '{}::{}' cannot have a body",
                type_name,
                method.name
            ));
        }

        method.flags.remove(MethodAttributes::ABSTRACT);
        method.body = Some(body);
        self.touch();
        Ok(())
    }

    fn accessor(&self, handle: MethodHandle, parameter: &str) -> Result<&MutableMethod> {
        if handle.owner != self.handle {
            return Err(argument_error!(
                parameter,
                "Accessor belongs to another type than '{}'",
                self.fullname()
            ));
        }
        match (handle.slot, self.method(handle)) {
            (MethodSlot::Method(_), Some(method)) => Ok(method),
            _ => Err(argument_error!(
                parameter,
                "Accessor must be a regular method of '{}'",
                self.fullname()
            )),
        }
    }

    /// Adds a property over existing accessor methods.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if no accessor is given, an accessor belongs to another
    /// type or has the wrong signature, or the accessors disagree on being static;
    /// [`Error::DuplicateMember`] if a property with the same name exists.
    pub fn add_property(
        &mut self,
        name: impl Into<String>,
        signature: TypeSignature,
        getter: Option<MethodHandle>,
        setter: Option<MethodHandle>,
    ) -> Result<PropertyHandle> {
        self.ensure_mutable()?;
        let name = name.into();
        if getter.is_none() && setter.is_none() {
            return Err(argument_error!(
                "getter",
                "Property '{}' requires at least one accessor",
                name
            ));
        }
        if signature.is_void() {
            return Err(argument_error!(
                "signature",
                "Property '{}' cannot be of type void",
                name
            ));
        }
        if self.properties.iter().any(|property| property.name == name) {
            return Err(self.duplicate("property", &name));
        }

        let mut is_static = None;
        if let Some(getter) = getter {
            let method = self.accessor(getter, "getter")?;
            if method.signature.arity() != 0 || method.signature.return_type != signature {
                return Err(argument_error!(
                    "getter",
                    "Get accessor of '{}' must have signature {} ()",
                    name,
                    signature
                ));
            }
            is_static = Some(method.is_static());
        }
        if let Some(setter) = setter {
            let method = self.accessor(setter, "setter")?;
            let valid = method.signature.return_type.is_void()
                && method.signature.arity() == 1
                && method.signature.parameters[0].ty == signature;
            if !valid {
                return Err(argument_error!(
                    "setter",
                    "Set accessor of '{}' must have signature void ({})",
                    name,
                    signature
                ));
            }
            if is_static.is_some_and(|getter_static| getter_static != method.is_static()) {
                return Err(argument_error!(
                    "setter",
                    "Accessors of '{}' must both be static or both be instance methods",
                    name
                ));
            }
        }

        let handle = PropertyHandle {
            owner: self.handle,
            index: to_index(self.properties.len()),
        };
        self.properties.push(MutableProperty {
            handle,
            name,
            signature,
            flags: PropertyAttributes::empty(),
            getter,
            setter,
        });
        self.touch();
        Ok(handle)
    }

    /// Adds a property together with `get_`/`set_` accessor methods built from the given
    /// bodies.
    ///
    /// # Errors
    /// See [`MutableType::add_method`] and [`MutableType::add_property`].
    pub fn add_property_with_accessors(
        &mut self,
        name: &str,
        signature: TypeSignature,
        access: MemberAccess,
        getter_body: Option<Expr>,
        setter_body: Option<Expr>,
    ) -> Result<PropertyHandle> {
        self.ensure_mutable()?;
        if self.properties.iter().any(|property| property.name == name) {
            return Err(self.duplicate("property", name));
        }
        let flags = (MethodAttributes::HIDE_BY_SIG | MethodAttributes::SPECIAL_NAME)
            .with_access(access);

        let getter = getter_body
            .map(|body| {
                self.add_method(
                    format!("get_{name}"),
                    flags,
                    MethodSignature::new(signature.clone(), Vec::new()),
                    Some(body),
                )
            })
            .transpose()?;
        let setter = setter_body
            .map(|body| {
                self.add_method(
                    format!("set_{name}"),
                    flags,
                    MethodSignature::with_parameters(
                        TypeSignature::Void,
                        vec![ParameterDeclaration::new("value", signature.clone())],
                    ),
                    Some(body),
                )
            })
            .transpose()?;

        self.add_property(name, signature, getter, setter)
    }

    /// Adds a property backed by a private field
    ///
    /// # Errors
    /// See [`MutableType::add_field`] and [`MutableType::add_property_with_accessors`].
    pub fn add_auto_property(
        &mut self,
        name: &str,
        signature: TypeSignature,
        access: MemberAccess,
    ) -> Result<PropertyHandle> {
        let field = self.add_field(
            format!("<{name}>k__BackingField"),
            signature.clone(),
            FieldAttributes::PRIVATE,
        )?;
        self.add_property_with_accessors(
            name,
            signature,
            access,
            Some(Expr::load_this_field(field)),
            Some(Expr::store_this_field(field, Expr::Argument(0))),
        )
    }

    /// Adds an event over existing accessor methods.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] for non-reference handler types, accessors of another
    /// type, accessors with the wrong signature or a static mismatch;
    /// [`Error::DuplicateMember`] if an event with the same name exists.
    pub fn add_event(
        &mut self,
        name: impl Into<String>,
        event_type: TypeSignature,
        add_method: MethodHandle,
        remove_method: MethodHandle,
        raise_method: Option<MethodHandle>,
    ) -> Result<EventHandle> {
        self.ensure_mutable()?;
        let name = name.into();
        if !event_type.is_reference() {
            return Err(argument_error!(
                "event_type",
                "Handler type of event '{}' must be a reference type",
                name
            ));
        }
        if self.events.iter().any(|event| event.name == name) {
            return Err(self.duplicate("event", &name));
        }

        let mut accessors = vec![
            ("add_method", self.accessor(add_method, "add_method")?),
            ("remove_method", self.accessor(remove_method, "remove_method")?),
        ];
        for (parameter, method) in &accessors {
            let valid = method.signature.return_type.is_void()
                && method.signature.arity() == 1
                && method.signature.parameters[0].ty == event_type;
            if !valid {
                return Err(argument_error!(
                    *parameter,
                    "Accessor of event '{}' must have signature void ({})",
                    name,
                    event_type
                ));
            }
        }
        if let Some(raise) = raise_method {
            accessors.push(("raise_method", self.accessor(raise, "raise_method")?));
        }
        let is_static = accessors[0].1.is_static();
        if let Some((parameter, _)) = accessors
            .iter()
            .find(|(_, method)| method.is_static() != is_static)
        {
            return Err(argument_error!(
                *parameter,
                "Accessors of event '{}' must all be static or all be instance methods",
                name
            ));
        }

        let handle = EventHandle {
            owner: self.handle,
            index: to_index(self.events.len()),
        };
        self.events.push(MutableEvent {
            handle,
            name,
            event_type,
            flags: EventAttributes::empty(),
            add_method,
            remove_method,
            raise_method,
        });
        self.touch();
        Ok(handle)
    }

    /// Returns true if this descriptor or its runtime base implements `interface`
    pub fn implements_interface(&self, interface: &TypeRc) -> bool {
        let own = self
            .interfaces
            .iter()
            .filter_map(TypeSignature::runtime_type)
            .any(|iface| iface.token == interface.token || iface.implements(interface));
        own || self
            .base_runtime_type()
            .is_some_and(|base| base.implements(interface))
    }

    /// Adds an interface implementation.
    ///
    /// An interface that is already implemented (directly or by a base type) is rejected
    /// unless `allow_reimplementation` is set.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `interface` is not an interface and
    /// [`Error::InvalidOperation`] for a rejected duplicate.
    pub fn add_interface(&mut self, interface: &TypeRc, allow_reimplementation: bool) -> Result<()> {
        self.ensure_mutable()?;
        if !interface.is_interface() {
            return Err(argument_error!(
                "interface",
                "'{}' is not an interface",
                interface.fullname()
            ));
        }

        let declared_here = self
            .interfaces
            .iter()
            .filter_map(TypeSignature::runtime_type)
            .any(|iface| iface.token == interface.token);
        if self.implements_interface(interface) {
            if !allow_reimplementation {
                return Err(invalid_operation!(
                    "Interface '{}' is already implemented by '{}'",
                    interface.fullname(),
                    self.fullname()
                ));
            }
            if declared_here {
                return Ok(());
            }
        }

        self.interfaces.push(TypeSignature::class(interface));
        self.touch();
        Ok(())
    }

    pub(crate) fn push_batch_interface(&mut self, interface: TypeHandle) -> Result<()> {
        self.ensure_mutable()?;
        let signature = TypeSignature::Mutable(interface);
        if self.interfaces.contains(&signature) {
            return Err(invalid_operation!(
                "Interface {:?} is already implemented by '{}'",
                interface,
                self.fullname()
            ));
        }
        self.interfaces.push(signature);
        self.touch();
        Ok(())
    }

    /// Applies a custom attribute to the type
    ///
    /// # Errors
    /// Returns [`Error::DescriptorSealed`] once the descriptor is sealed.
    pub fn add_custom_attribute(&mut self, attribute: CustomAttributeDeclaration) -> Result<()> {
        self.ensure_mutable()?;
        self.custom_attributes.push(attribute);
        self.touch();
        Ok(())
    }

    /// Applies a custom attribute to an added method
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `method` does not belong to this descriptor.
    pub fn add_method_attribute(
        &mut self,
        method: MethodHandle,
        attribute: CustomAttributeDeclaration,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let type_name = self.fullname();
        self.method_mut(method)
            .ok_or_else(|| argument_error!("method", "Method does not belong to '{}'", type_name))?
            .custom_attributes
            .push(attribute);
        self.touch();
        Ok(())
    }

    /// Applies a custom attribute to an added field
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `field` does not belong to this descriptor.
    pub fn add_field_attribute(
        &mut self,
        field: FieldHandle,
        attribute: CustomAttributeDeclaration,
    ) -> Result<()> {
        self.ensure_mutable()?;
        if field.owner != self.handle {
            return Err(argument_error!(
                "field",
                "Field does not belong to '{}'",
                self.fullname()
            ));
        }
        let type_name = self.fullname();
        self.fields
            .get_mut(field.index as usize)
            .ok_or_else(|| argument_error!("field", "Unknown field of '{}'", type_name))?
            .custom_attributes
            .push(attribute);
        self.touch();
        Ok(())
    }

    /// Returns the descriptor overriding `base_method`, creating it on first use.
    ///
    /// The created override keeps the name, signature and access of the base method, reuses
    /// its virtual slot and delegates non-virtually to the most derived existing
    /// implementation; if that implementation is abstract the override is abstract too.
    /// Any method of the same override chain maps to the same descriptor. The flag reports
    /// whether the descriptor was created by this call.
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the method is not declared on the base chain or is an
    /// interface method, and [`Error::NotSupported`] for non-virtual, final or inaccessible
    /// methods.
    pub fn get_or_add_override(&mut self, base_method: &MethodRc) -> Result<(MethodHandle, bool)> {
        self.ensure_mutable()?;
        let Some(base) = self.base_runtime_type() else {
            return Err(invalid_operation!(
                "'{}' has no runtime base type to override methods of",
                self.fullname()
            ));
        };
        let Some(declaring) = base_method.declaring_type() else {
            return Err(argument_error!(
                "base_method",
                "Declaring type of '{}' has been dropped",
                base_method.name
            ));
        };
        if declaring.is_interface() {
            return Err(argument_error!(
                "base_method",
                "'{}' is an interface method, use get_or_add_implementation",
                base_method.full_name()
            ));
        }
        if declaring.token != base.token && !base.is_subclass_of(&declaring) {
            return Err(argument_error!(
                "base_method",
                "'{}' is not declared on the base chain of '{}'",
                base_method.full_name(),
                self.fullname()
            ));
        }
        if !base_method.is_virtual() {
            return Err(not_supported!(
                "Method '{}' is not virtual and cannot be overridden",
                base_method.full_name()
            ));
        }

        let root = base_method.slot_root();
        if let Some(&existing) = self.overrides.get(&root.token) {
            return Ok((existing, false));
        }
        let own = self
            .methods
            .iter()
            .find(|method| {
                method.is_virtual()
                    && !method.flags.contains(MethodAttributes::NEW_SLOT)
                    && method.name == base_method.name
                    && method.signature.matches(&base_method.signature)
            })
            .map(|method| method.handle);
        if let Some(existing) = own {
            self.overrides.insert(root.token, existing);
            return Ok((existing, false));
        }

        let implementation = base.resolve_virtual(base_method);
        if implementation.is_final() {
            return Err(not_supported!(
                "Method '{}' is final and cannot be overridden",
                implementation.full_name()
            ));
        }
        let access = match implementation.access() {
            MemberAccess::FamilyOrAssembly => MemberAccess::Family,
            access if access.is_accessible_from_subclass() => access,
            access => {
                return Err(not_supported!(
                    "Method '{}' is {} and cannot be overridden from '{}'",
                    implementation.full_name(),
                    access,
                    self.fullname()
                ))
            }
        };

        let mut flags = (MethodAttributes::VIRTUAL | MethodAttributes::HIDE_BY_SIG).with_access(access);
        let body = if implementation.is_abstract() {
            flags |= MethodAttributes::ABSTRACT;
            None
        } else {
            Some(Expr::call_base(
                Expr::This,
                &implementation,
                Expr::forward_arguments(implementation.signature.arity()),
            ))
        };

        let handle = MethodHandle {
            owner: self.handle,
            slot: MethodSlot::Method(to_index(self.methods.len())),
        };
        let mut method = MutableMethod::new(
            handle,
            base_method.name.clone(),
            MethodKind::Method,
            flags,
            base_method.signature.clone(),
            body,
        );
        method.base_method = Some(base_method.clone());
        self.methods.push(method);
        self.overrides.insert(root.token, handle);
        self.touch();
        Ok((handle, true))
    }

    /// Returns the descriptor implementing `interface_method`, creating it on first use.
    ///
    /// An existing public virtual method of this descriptor with a matching name and
    /// signature is reused. Otherwise an overridable base implementation is overridden, and
    /// if there is none a public virtual abstract method is added that the caller gives a
    /// body through [`MutableType::set_method_body`].
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if the interface is not implemented by this descriptor
    /// and [`Error::NotSupported`] if a base type implements the method with a final or
    /// non-virtual method.
    pub fn get_or_add_implementation(
        &mut self,
        interface_method: &MethodRc,
    ) -> Result<(MethodHandle, bool)> {
        self.ensure_mutable()?;
        let Some(interface) = interface_method
            .declaring_type()
            .filter(|ty| ty.is_interface())
        else {
            return Err(argument_error!(
                "interface_method",
                "'{}' is not an interface method",
                interface_method.full_name()
            ));
        };
        if !self.implements_interface(&interface) {
            return Err(argument_error!(
                "interface_method",
                "'{}' does not implement '{}'",
                self.fullname(),
                interface.fullname()
            ));
        }

        if let Some(&existing) = self.implementations.get(&interface_method.token) {
            return Ok((existing, false));
        }
        let own = self
            .methods
            .iter()
            .find(|method| {
                method.is_virtual()
                    && method.flags.access() == MemberAccess::Public
                    && method.name == interface_method.name
                    && method.signature.matches(&interface_method.signature)
            })
            .map(|method| method.handle);
        if let Some(existing) = own {
            self.implementations.insert(interface_method.token, existing);
            return Ok((existing, false));
        }

        let inherited = self
            .base_runtime_type()
            .and_then(|base| base.resolve_interface_method(interface_method));
        if let Some(implementation) = inherited {
            if !implementation.is_virtual() || implementation.is_final() {
                return Err(not_supported!(
                    "Interface method '{}' is implemented by '{}' which cannot be overridden",
                    interface_method.full_name(),
                    implementation.full_name()
                ));
            }
            let (handle, created) = self.get_or_add_override(&implementation)?;
            self.implementations.insert(interface_method.token, handle);
            return Ok((handle, created));
        }

        let flags = MethodAttributes::PUBLIC
            | MethodAttributes::VIRTUAL
            | MethodAttributes::NEW_SLOT
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::ABSTRACT;
        self.validate_method(&interface_method.name, flags, &interface_method.signature, false)?;
        let handle = MethodHandle {
            owner: self.handle,
            slot: MethodSlot::Method(to_index(self.methods.len())),
        };
        let mut method = MutableMethod::new(
            handle,
            interface_method.name.clone(),
            MethodKind::Method,
            flags,
            interface_method.signature.clone(),
            None,
        );
        method.explicit_overrides.push(interface_method.clone());
        self.methods.push(method);
        self.implementations.insert(interface_method.token, handle);
        self.touch();
        Ok((handle, true))
    }

    /// Returns true if the generated type has to be abstract: it is an interface, was
    /// created abstract, has an abstract method, leaves an abstract base method without
    /// implementation, or leaves an interface method unimplemented.
    ///
    /// Interface descriptors of the same batch are not visible here; see
    /// [`crate::model::TypeArena::is_abstract`]. The result is cached until the next
    /// structural change.
    pub fn is_abstract(&self) -> bool {
        if let Some(cached) = self.abstract_cache.get() {
            return cached;
        }
        let computed = self.compute_abstract();
        self.abstract_cache.set(Some(computed));
        computed
    }

    fn compute_abstract(&self) -> bool {
        if self.is_interface()
            || self.flags.contains(TypeAttributes::ABSTRACT)
            || self.methods.iter().any(MutableMethod::is_abstract)
        {
            return true;
        }

        let base = self.base_runtime_type();
        if let Some(base) = &base {
            for ty in base.hierarchy() {
                for (_, method) in ty.methods.iter() {
                    if method.is_abstract()
                        && base.resolve_virtual(method).is_abstract()
                        && !self.overrides_slot(method)
                    {
                        return true;
                    }
                }
            }
        }

        let mut pending: Vec<TypeRc> = self
            .interfaces
            .iter()
            .filter_map(TypeSignature::runtime_type)
            .collect();
        while let Some(interface) = pending.pop() {
            for (_, method) in interface.methods.iter() {
                if !method.is_static() && !self.implements_method(method, base.as_ref()) {
                    return true;
                }
            }
            pending.extend(interface.interfaces.iter().map(|(_, iface)| iface.clone()));
        }
        false
    }

    fn overrides_slot(&self, method: &MethodRc) -> bool {
        self.overrides.contains_key(&method.slot_root().token)
            || self.methods.iter().any(|own| {
                own.is_virtual()
                    && !own.flags.contains(MethodAttributes::NEW_SLOT)
                    && own.name == method.name
                    && own.signature.matches(&method.signature)
            })
    }

    pub(crate) fn implements_method(
        &self,
        interface_method: &MethodRc,
        base: Option<&TypeRc>,
    ) -> bool {
        if self.implementations.contains_key(&interface_method.token) {
            return true;
        }
        self.has_public_virtual(&interface_method.name, &interface_method.signature)
            || base
            .and_then(|base| base.resolve_interface_method(interface_method))
            .is_some_and(|implementation| !implementation.is_abstract())
    }

    /// Returns true if a public virtual method of this descriptor matches `name` and `signature`
    pub(crate) fn has_public_virtual(&self, name: &str, signature: &MethodSignature) -> bool {
        self.methods.iter().any(|method| {
            method.is_virtual()
                && method.flags.access() == MemberAccess::Public
                && method.name == name
                && method.signature.matches(signature)
        })
    }
}

impl std::fmt::Debug for MutableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableType")
            .field("handle", &self.handle)
            .field("fullname", &self.fullname())
            .field("flags", &self.flags)
            .field("modified", &self.modified)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}
