//! [`CodeGenerator`] implementation targeting the in-process runtime.

use std::{
    collections::hash_map::RandomState,
    fs,
    hash::{BuildHasher, Hasher},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;
use uguid::Guid;

use crate::{
    codegen::{persist, CodeGenerator, TypeBuilder},
    runtime::{
        CustomAttribute, EventAttributes, EventRc, Expr, FieldAttributes, FieldRc,
        MethodAttributes, MethodKind, MethodOverride, MethodRc, MethodSignature,
        PropertyAttributes, PropertyRc, RuntimeEvent, RuntimeField, RuntimeMethod,
        RuntimeProperty, RuntimeType, TokenKind, TypeAttributes, TypeOrigin, TypeRc, TypeRef,
        TypeRegistry, TypeSignature,
    },
    Result,
};

/// Placeholder replaced by the module counter in module name patterns
pub const MODULE_COUNTER_PLACEHOLDER: &str = "{counter}";

/// Naming and placement of generated modules, shared by all generators of one pipeline
#[derive(Debug, Clone)]
pub struct ModuleNaming {
    directory: Option<PathBuf>,
    pattern: String,
    counter: Arc<AtomicU64>,
}

impl ModuleNaming {
    /// Creates a naming scheme. `pattern` may contain `{counter}`; `directory` defaults to
    /// the current working directory.
    pub fn new(directory: Option<PathBuf>, pattern: impl Into<String>) -> Self {
        ModuleNaming {
            directory,
            pattern: pattern.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_name(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        self.pattern
            .replace(MODULE_COUNTER_PLACEHOLDER, &counter.to_string())
    }

    fn directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(directory) => Ok(directory.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

fn new_module_id() -> Guid {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();

    let mut bytes = [0u8; 16];
    for (index, chunk) in bytes.chunks_mut(8).enumerate() {
        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u128(nanos);
        hasher.write_usize(index);
        chunk.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    // RFC 4122 version 4 layout
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    Guid::from_bytes(bytes)
}

/// Builds generated types directly as [`RuntimeType`]s of a [`TypeRegistry`]
pub struct RuntimeCodeGenerator {
    registry: Arc<TypeRegistry>,
    naming: ModuleNaming,
    module_id: Guid,
    module_name: String,
    types: Vec<TypeRc>,
}

impl RuntimeCodeGenerator {
    /// Creates a generator that starts a fresh module
    pub fn new(registry: Arc<TypeRegistry>, naming: ModuleNaming) -> Self {
        let module_name = naming.next_name();
        RuntimeCodeGenerator {
            registry,
            naming,
            module_id: new_module_id(),
            module_name,
            types: Vec::new(),
        }
    }

    fn start_new_module(&mut self) {
        self.module_id = new_module_id();
        self.module_name = self.naming.next_name();
        self.types.clear();
    }
}

impl CodeGenerator for RuntimeCodeGenerator {
    fn module_id(&self) -> Guid {
        self.module_id
    }

    fn module_name(&self) -> String {
        self.module_name.clone()
    }

    fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        declaring: Option<&TypeRc>,
    ) -> Result<Box<dyn TypeBuilder>> {
        let namespace = if declaring.is_some() { "" } else { namespace };
        let ty = Arc::new(RuntimeType::new(
            self.registry.next_token(TokenKind::Type),
            namespace,
            name,
            flags,
            TypeOrigin::Generated,
        ));
        if let Some(outer) = declaring {
            ty.set_declaring_type(outer)?;
            outer.nested_types.push(TypeRef::new(&ty));
        }

        self.types.push(ty.clone());
        Ok(Box::new(RuntimeTypeBuilder::new(ty, self.registry.clone())))
    }

    fn flush(&mut self, participant_configuration_id: &str) -> Result<Option<PathBuf>> {
        let types = self.generated_types();
        if types.is_empty() {
            return Ok(None);
        }

        let directory = self.naming.directory()?;
        fs::create_dir_all(&directory)?;
        let path = directory.join(format!("{}.xml", self.module_name));
        let module = persist::ModuleHeader {
            id: self.module_id,
            name: self.module_name.clone(),
            participant_configuration_id: participant_configuration_id.to_string(),
        };
        persist::write_module(&path, &module, &types)?;
        debug!(
            module = %self.module_name,
            types = types.len(),
            path = %path.display(),
            "flushed module"
        );

        self.start_new_module();
        Ok(Some(path))
    }

    fn generated_types(&self) -> Vec<TypeRc> {
        self.types
            .iter()
            .filter(|ty| ty.is_complete())
            .cloned()
            .collect()
    }
}

/// [`TypeBuilder`] over a declared [`RuntimeType`]
pub struct RuntimeTypeBuilder {
    ty: TypeRc,
    registry: Arc<TypeRegistry>,
    created: bool,
}

impl RuntimeTypeBuilder {
    pub(crate) fn new(ty: TypeRc, registry: Arc<TypeRegistry>) -> Self {
        RuntimeTypeBuilder {
            ty,
            registry,
            created: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.created {
            return Err(invalid_operation!(
                "Type '{}' has already been created",
                self.ty.fullname()
            ));
        }
        Ok(())
    }

    fn ensure_own(&self, method: &MethodRc) -> Result<()> {
        if method
            .declaring_type()
            .is_some_and(|owner| owner.token == self.ty.token)
        {
            return Ok(());
        }
        Err(argument_error!(
            "method",
            "'{}' is not declared by '{}'",
            method.full_name(),
            self.ty.fullname()
        ))
    }

    fn new_method(
        &self,
        name: &str,
        kind: MethodKind,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> MethodRc {
        Arc::new(RuntimeMethod::new(
            self.registry.next_token(TokenKind::Method),
            name,
            &self.ty,
            kind,
            flags,
            signature,
        ))
    }
}

impl TypeBuilder for RuntimeTypeBuilder {
    fn runtime_type(&self) -> &TypeRc {
        &self.ty
    }

    fn set_parent(&mut self, base: &TypeRc) -> Result<()> {
        self.ensure_open()?;
        if base.is_sealed() || base.is_interface() {
            return Err(argument_error!(
                "base",
                "'{}' cannot be used as base type of '{}'",
                base.fullname(),
                self.ty.fullname()
            ));
        }
        self.ty.set_base(base.clone())
    }

    fn add_interface_implementation(&mut self, interface: &TypeRc) -> Result<()> {
        self.ensure_open()?;
        if !interface.is_interface() {
            return Err(argument_error!(
                "interface",
                "'{}' is not an interface",
                interface.fullname()
            ));
        }
        self.ty.interfaces.push(interface.clone());
        Ok(())
    }

    fn set_custom_attribute(&mut self, attribute: CustomAttribute) -> Result<()> {
        self.ensure_open()?;
        self.ty.custom_attributes.push(attribute);
        Ok(())
    }

    fn define_field(
        &mut self,
        name: &str,
        signature: TypeSignature,
        flags: FieldAttributes,
    ) -> Result<FieldRc> {
        self.ensure_open()?;
        let field = Arc::new(RuntimeField::new(
            self.registry.next_token(TokenKind::Field),
            name,
            &self.ty,
            signature,
            flags,
        ));
        self.ty.fields.push(field.clone());
        Ok(field)
    }

    fn define_constructor(
        &mut self,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> Result<MethodRc> {
        self.ensure_open()?;
        let flags = flags | MethodAttributes::SPECIAL_NAME | MethodAttributes::RT_SPECIAL_NAME;
        let ctor = self.new_method(".ctor", MethodKind::Constructor, flags, signature);
        self.ty.constructors.push(ctor.clone());
        Ok(ctor)
    }

    fn define_type_initializer(&mut self) -> Result<MethodRc> {
        self.ensure_open()?;
        let initializer = self.new_method(
            ".cctor",
            MethodKind::TypeInitializer,
            MethodAttributes::PRIVATE
                | MethodAttributes::STATIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            MethodSignature::void(),
        );
        self.ty.set_type_initializer(initializer.clone())?;
        Ok(initializer)
    }

    fn define_method(
        &mut self,
        name: &str,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> Result<MethodRc> {
        self.ensure_open()?;
        let method = self.new_method(name, MethodKind::Method, flags, signature);
        self.ty.methods.push(method.clone());
        Ok(method)
    }

    fn set_method_body(&mut self, method: &MethodRc, body: Expr) -> Result<()> {
        self.ensure_open()?;
        self.ensure_own(method)?;
        method.set_body(body)
    }

    fn define_method_override(&mut self, body: &MethodRc, declaration: &MethodRc) -> Result<()> {
        self.ensure_open()?;
        self.ensure_own(body)?;
        if !declaration.is_virtual() {
            return Err(argument_error!(
                "declaration",
                "'{}' is not virtual",
                declaration.full_name()
            ));
        }
        self.ty.overrides.push(MethodOverride {
            declaration: declaration.clone(),
            body: body.clone(),
        });
        Ok(())
    }

    fn define_property(
        &mut self,
        name: &str,
        signature: TypeSignature,
        getter: Option<MethodRc>,
        setter: Option<MethodRc>,
    ) -> Result<PropertyRc> {
        self.ensure_open()?;
        let property = Arc::new(RuntimeProperty::new(
            self.registry.next_token(TokenKind::Property),
            name,
            &self.ty,
            signature,
            PropertyAttributes::empty(),
            getter,
            setter,
        ));
        self.ty.properties.push(property.clone());
        Ok(property)
    }

    fn define_event(
        &mut self,
        name: &str,
        event_type: TypeSignature,
        add_method: MethodRc,
        remove_method: MethodRc,
        raise_method: Option<MethodRc>,
    ) -> Result<EventRc> {
        self.ensure_open()?;
        let event = Arc::new(RuntimeEvent::new(
            self.registry.next_token(TokenKind::Event),
            name,
            &self.ty,
            event_type,
            EventAttributes::empty(),
            add_method,
            remove_method,
            raise_method,
        ));
        self.ty.events.push(event.clone());
        Ok(event)
    }

    fn create_type(&mut self) -> Result<TypeRc> {
        self.ensure_open()?;

        let members = self
            .ty
            .method_list()
            .into_iter()
            .chain(self.ty.constructor_list())
            .chain(self.ty.type_initializer());
        for method in members {
            if method.is_abstract() {
                if !self.ty.is_abstract() {
                    return Err(invalid_operation!(
                        "Non-abstract type '{}' declares abstract method '{}'",
                        self.ty.fullname(),
                        method.name
                    ));
                }
            } else if method.body().is_none() {
                return Err(invalid_operation!(
                    "Method '{}' has no body",
                    method.full_name()
                ));
            }
        }

        self.ty.mark_complete();
        self.registry.insert(&self.ty);
        self.created = true;
        Ok(self.ty.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::fixtures::registry, Error};

    fn generator() -> RuntimeCodeGenerator {
        RuntimeCodeGenerator::new(
            Arc::new(registry()),
            ModuleNaming::new(None, "Test.Module.{counter}"),
        )
    }

    #[test]
    fn test_module_names_follow_pattern() {
        let naming = ModuleNaming::new(None, "Gen.{counter}");
        let first = RuntimeCodeGenerator::new(Arc::new(registry()), naming.clone());
        let second = RuntimeCodeGenerator::new(Arc::new(registry()), naming);

        assert_eq!(first.module_name(), "Gen.1");
        assert_eq!(second.module_name(), "Gen.2");
        assert_ne!(first.module_id(), second.module_id());
    }

    #[test]
    fn test_create_type_requires_bodies() {
        let mut generator = generator();
        let mut builder = generator
            .define_type("App", "Generated", TypeAttributes::PUBLIC, None)
            .unwrap();
        builder
            .define_method(
                "Run",
                MethodAttributes::PUBLIC,
                MethodSignature::void(),
            )
            .unwrap();

        assert!(matches!(builder.create_type(), Err(Error::InvalidOperation(_))));
        assert!(generator.generated_types().is_empty());
    }

    #[test]
    fn test_created_type_is_registered_once() {
        let mut generator = generator();
        let mut builder = generator
            .define_type("App", "Generated", TypeAttributes::PUBLIC, None)
            .unwrap();
        let method = builder
            .define_method(
                "Answer",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::I4, vec![]),
            )
            .unwrap();
        builder.set_method_body(&method, Expr::constant(42)).unwrap();

        let ty = builder.create_type().unwrap();
        assert!(ty.is_complete());
        assert_eq!(ty.origin, TypeOrigin::Generated);
        assert_eq!(method.invoke(None, &[]).unwrap().as_i4(), Some(42));
        assert_eq!(generator.generated_types().len(), 1);
        assert!(matches!(builder.create_type(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_body_of_foreign_method_rejected() {
        let mut generator = generator();
        let mut first = generator
            .define_type("App", "First", TypeAttributes::PUBLIC, None)
            .unwrap();
        let mut second = generator
            .define_type("App", "Second", TypeAttributes::PUBLIC, None)
            .unwrap();
        let method = first
            .define_method("Run", MethodAttributes::PUBLIC, MethodSignature::void())
            .unwrap();

        assert!(matches!(
            second.set_method_body(&method, Expr::empty()),
            Err(Error::Argument { .. })
        ));
    }
}
