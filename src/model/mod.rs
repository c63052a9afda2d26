//! Mutable type descriptor model.
//!
//! Participants describe the types they want generated by editing descriptors. All
//! descriptors of one batch live in a [`TypeArena`] and refer to each other (and to their
//! own members) through `Copy` handles, so a batch can contain mutually referencing types
//! before any of them exists as a runtime type.
//!
//! # Key Components
//!
//! - [`TypeArena`]: Owns the descriptors of one batch
//! - [`MutableType`]: One type descriptor with its members and override registry
//! - [`TypeHandle`], [`MethodHandle`], [`FieldHandle`]: Stable cross-references
//!
//! # Examples
//!
//! ```rust,no_run
//! use typeforge::model::TypeArena;
//! use typeforge::runtime::{Expr, MethodAttributes, MethodSignature, TypeAttributes, TypeSignature};
//!
//! let mut arena = TypeArena::new();
//! let helper = arena.create_type("App", "Helper", TypeAttributes::PUBLIC, None)?;
//! arena.type_mut(helper)?.add_method(
//!     "Answer",
//!     MethodAttributes::PUBLIC | MethodAttributes::STATIC,
//!     MethodSignature::new(TypeSignature::I4, vec![]),
//!     Some(Expr::constant(42)),
//! )?;
//! assert!(arena.is_modified());
//! # Ok::<(), typeforge::Error>(())
//! ```

mod descriptor;
mod handles;
mod members;

pub use descriptor::MutableType;
pub use handles::{EventHandle, FieldHandle, MethodHandle, MethodSlot, PropertyHandle, TypeHandle};
pub use members::{
    CustomAttributeDeclaration, MutableEvent, MutableField, MutableMethod, MutableProperty,
};

use std::collections::HashSet;

use crate::{
    runtime::{TypeAttributes, TypeRc, TypeSignature},
    Result,
};

/// All descriptors of one generation batch
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<MutableType>,
}

impl TypeArena {
    /// Creates an empty arena
    #[must_use]
    pub fn new() -> Self {
        TypeArena { types: Vec::new() }
    }

    fn next_handle(&self) -> TypeHandle {
        TypeHandle::new(handles::to_index(self.types.len()))
    }

    pub(crate) fn create_proxy(&mut self, requested: &TypeRc, name: &str) -> TypeHandle {
        let handle = self.next_handle();
        self.types
            .push(MutableType::new_proxy(handle, requested, name));
        handle
    }

    fn validate_base(&self, base: Option<&TypeSignature>, flags: TypeAttributes) -> Result<()> {
        let Some(base) = base else {
            return Ok(());
        };
        if flags.contains(TypeAttributes::INTERFACE) {
            return Err(argument_error!("base", "Interfaces cannot have a base type"));
        }
        match base {
            TypeSignature::Class(_) => {
                let Some(ty) = base.runtime_type() else {
                    return Err(argument_error!("base", "Base type has been dropped"));
                };
                if ty.is_sealed() || ty.is_interface() {
                    return Err(argument_error!(
                        "base",
                        "'{}' cannot be used as a base type",
                        ty.fullname()
                    ));
                }
                Ok(())
            }
            TypeSignature::Mutable(handle) => match self.get(*handle) {
                Some(ty)
                    if !ty.is_interface() && !ty.flags().contains(TypeAttributes::SEALED) =>
                {
                    Ok(())
                }
                Some(ty) => Err(argument_error!(
                    "base",
                    "'{}' cannot be used as a base type",
                    ty.fullname()
                )),
                None => Err(argument_error!("base", "Unknown descriptor {:?}", handle)),
            },
            other => Err(argument_error!(
                "base",
                "'{}' cannot be used as a base type",
                other
            )),
        }
    }

    /// Creates an additional top-level descriptor. A `None` base derives from `System.Object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for sealed, interface or primitive base types and
    /// for interfaces with a base type.
    pub fn create_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        base: Option<TypeSignature>,
    ) -> Result<TypeHandle> {
        if name.is_empty() {
            return Err(argument_error!("name", "Type name must not be empty"));
        }
        self.validate_base(base.as_ref(), flags)?;

        let handle = self.next_handle();
        let mut ty = MutableType::new(handle, namespace, name, flags, base);
        ty.touch();
        self.types.push(ty);
        Ok(handle)
    }

    /// Creates an interface descriptor
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for an empty name.
    pub fn create_interface(&mut self, namespace: &str, name: &str) -> Result<TypeHandle> {
        self.create_type(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            None,
        )
    }

    /// Creates a descriptor nested in `outer`. Top-level visibility flags are translated to
    /// their nested counterparts.
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for an unknown outer descriptor or an invalid base,
    /// [`crate::Error::DescriptorSealed`] if the outer descriptor is sealed.
    pub fn add_nested_type(
        &mut self,
        outer: TypeHandle,
        name: &str,
        flags: TypeAttributes,
        base: Option<TypeSignature>,
    ) -> Result<TypeHandle> {
        self.type_ref(outer)?.ensure_mutable()?;

        let mut nested_flags = flags;
        if flags.visibility() <= TypeAttributes::PUBLIC.bits() {
            nested_flags.remove(TypeAttributes::PUBLIC);
            nested_flags |= if flags.is_visible() {
                TypeAttributes::NESTED_PUBLIC
            } else {
                TypeAttributes::NESTED_PRIVATE
            };
        }

        let handle = self.create_type("", name, nested_flags, base)?;
        if let Some(nested) = self.types.get_mut(handle.index()) {
            nested.declaring = Some(outer);
        }
        let outer = self.type_mut(outer)?;
        outer.nested_types.push(handle);
        outer.touch();
        Ok(handle)
    }

    /// Makes `ty` implement the interface descriptor `interface` of the same batch
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if `interface` is not an interface descriptor and
    /// [`crate::Error::InvalidOperation`] if it is already implemented.
    pub fn add_batch_interface(&mut self, ty: TypeHandle, interface: TypeHandle) -> Result<()> {
        let target = self.type_ref(interface)?;
        if !target.is_interface() {
            return Err(argument_error!(
                "interface",
                "'{}' is not an interface",
                target.fullname()
            ));
        }
        self.type_mut(ty)?.push_batch_interface(interface)
    }

    /// Returns true if the type generated for `handle` has to be abstract.
    ///
    /// Extends [`MutableType::is_abstract`] with the interface descriptors of this batch:
    /// every instance method they declare, directly or through the interfaces they extend,
    /// needs a matching public virtual method on `handle`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for a handle of another batch.
    pub fn is_abstract(&self, handle: TypeHandle) -> Result<bool> {
        let ty = self.type_ref(handle)?;
        if ty.is_abstract() {
            return Ok(true);
        }

        let base = ty.base_runtime_type();
        let mut visited = HashSet::new();
        let mut pending: Vec<TypeHandle> = ty
            .interfaces()
            .iter()
            .filter_map(TypeSignature::mutable_handle)
            .collect();
        while let Some(interface) = pending.pop() {
            if !visited.insert(interface) {
                continue;
            }
            let interface = self.type_ref(interface)?;
            let unimplemented = interface.methods().iter().any(|method| {
                !method.is_static() && !ty.has_public_virtual(method.name(), method.signature())
            });
            if unimplemented {
                return Ok(true);
            }

            for extended in interface.interfaces() {
                match extended {
                    TypeSignature::Mutable(handle) => pending.push(*handle),
                    other => {
                        let Some(runtime) = other.runtime_type() else {
                            continue;
                        };
                        let missing = runtime.methods.iter().any(|(_, method)| {
                            !method.is_static() && !ty.implements_method(method, base.as_ref())
                        });
                        if missing {
                            return Ok(true);
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// Looks up a descriptor
    pub fn get(&self, handle: TypeHandle) -> Option<&MutableType> {
        self.types.get(handle.index())
    }

    /// Looks up a descriptor for editing
    pub fn get_mut(&mut self, handle: TypeHandle) -> Option<&mut MutableType> {
        self.types.get_mut(handle.index())
    }

    /// Looks up a descriptor, failing for unknown handles
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for a handle of another arena.
    pub fn type_ref(&self, handle: TypeHandle) -> Result<&MutableType> {
        self.get(handle)
            .ok_or_else(|| argument_error!("handle", "Unknown descriptor {:?}", handle))
    }

    /// Looks up a descriptor for editing, failing for unknown handles
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] for a handle of another arena.
    pub fn type_mut(&mut self, handle: TypeHandle) -> Result<&mut MutableType> {
        self.get_mut(handle)
            .ok_or_else(|| argument_error!("handle", "Unknown descriptor {:?}", handle))
    }

    /// Full name including enclosing descriptors (`Outer+Inner`)
    pub fn fullname(&self, handle: TypeHandle) -> String {
        match self.get(handle) {
            Some(ty) => match ty.declaring_type() {
                Some(outer) => format!("{}+{}", self.fullname(outer), ty.name()),
                None => ty.fullname(),
            },
            None => format!("{handle:?}"),
        }
    }

    /// All descriptors in creation order
    pub fn iter(&self) -> impl Iterator<Item = &MutableType> {
        self.types.iter()
    }

    /// All handles in creation order
    pub fn handles(&self) -> Vec<TypeHandle> {
        self.types.iter().map(MutableType::handle).collect()
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the arena holds no descriptor
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns true if any descriptor recorded a structural change
    pub fn is_modified(&self) -> bool {
        self.types.iter().any(MutableType::is_modified)
    }

    pub(crate) fn seal_all(&mut self) {
        for ty in &mut self.types {
            ty.seal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        runtime::{
            ClassBuilder, Expr, FieldAttributes, MemberAccess, MethodAttributes, MethodSignature,
            ParameterDeclaration,
        },
        test::fixtures::{animal_hierarchy, registry},
        Error,
    };

    fn public_method() -> MethodAttributes {
        MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG
    }

    #[test]
    fn test_proxy_copies_accessible_constructors_without_modification() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();

        let proxy = arena.create_proxy(&animal, "Animal_Proxy_1");
        let proxy = arena.get(proxy).unwrap();
        assert_eq!(proxy.constructors().len(), 1);
        assert_eq!(proxy.constructors()[0].flags().access(), MemberAccess::Family);
        assert!(!proxy.is_modified());
        assert!(proxy.is_abstract());

        let dog_proxy = arena.create_proxy(&dog, "Dog_Proxy_1");
        assert!(!arena.get(dog_proxy).unwrap().is_abstract());
        assert!(!arena.is_modified());
    }

    #[test]
    fn test_add_field_validation() {
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Holder", TypeAttributes::PUBLIC, None)
            .unwrap();
        let ty = arena.type_mut(handle).unwrap();

        let field = ty
            .add_field("count", TypeSignature::I4, FieldAttributes::PRIVATE)
            .unwrap();
        assert_eq!(ty.field(field).unwrap().name(), "count");
        assert!(matches!(
            ty.add_field("void", TypeSignature::Void, FieldAttributes::PRIVATE),
            Err(Error::Argument { .. })
        ));
        assert!(matches!(
            ty.add_field("count", TypeSignature::I8, FieldAttributes::PRIVATE),
            Err(Error::DuplicateMember { kind: "field", .. })
        ));
    }

    #[test]
    fn test_add_method_flag_validation() {
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Shape", TypeAttributes::PUBLIC, None)
            .unwrap();
        let ty = arena.type_mut(handle).unwrap();
        let signature = MethodSignature::new(TypeSignature::R8, vec![]);

        let abstract_only = public_method() | MethodAttributes::ABSTRACT;
        assert!(matches!(
            ty.add_method("Area", abstract_only, signature.clone(), None),
            Err(Error::Argument { .. })
        ));
        let abstract_virtual = abstract_only | MethodAttributes::VIRTUAL;
        assert!(matches!(
            ty.add_method("Area", abstract_virtual, signature.clone(), Some(Expr::constant(1.0))),
            Err(Error::Argument { .. })
        ));
        let static_virtual = public_method() | MethodAttributes::STATIC | MethodAttributes::VIRTUAL;
        assert!(matches!(
            ty.add_method("Area", static_virtual, signature.clone(), Some(Expr::constant(1.0))),
            Err(Error::Argument { .. })
        ));

        assert!(!ty.is_abstract());
        let area = ty
            .add_method("Area", abstract_virtual, signature.clone(), None)
            .unwrap();
        assert!(ty.is_abstract());
        assert!(matches!(
            ty.add_method("Area", public_method(), signature, Some(Expr::constant(2.0))),
            Err(Error::DuplicateMember { kind: "method", .. })
        ));

        ty.set_method_body(area, Expr::constant(3.0)).unwrap();
        assert!(!ty.is_abstract());
        assert!(!ty.method(area).unwrap().is_abstract());
    }

    #[test]
    fn test_constructor_rules() {
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Point", TypeAttributes::PUBLIC, None)
            .unwrap();
        let ty = arena.type_mut(handle).unwrap();

        let parameters = vec![ParameterDeclaration::new("x", TypeSignature::I4)];
        ty.add_constructor(MethodAttributes::PUBLIC, parameters.clone(), Expr::empty())
            .unwrap();
        assert!(matches!(
            ty.add_constructor(MethodAttributes::PUBLIC, parameters, Expr::empty()),
            Err(Error::DuplicateMember { .. })
        ));
        assert!(matches!(
            ty.add_constructor(
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                Vec::new(),
                Expr::empty()
            ),
            Err(Error::Argument { .. })
        ));

        ty.add_type_initializer(Expr::empty()).unwrap();
        assert!(matches!(
            ty.add_type_initializer(Expr::empty()),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_property_accessor_validation() {
        let mut arena = TypeArena::new();
        let first = arena
            .create_type("App", "First", TypeAttributes::PUBLIC, None)
            .unwrap();
        let second = arena
            .create_type("App", "Second", TypeAttributes::PUBLIC, None)
            .unwrap();

        let foreign = arena
            .type_mut(second)
            .unwrap()
            .add_method(
                "get_Name",
                public_method(),
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::constant("x")),
            )
            .unwrap();

        let ty = arena.type_mut(first).unwrap();
        assert!(matches!(
            ty.add_property("Name", TypeSignature::String, Some(foreign), None),
            Err(Error::Argument { .. })
        ));

        let getter = ty
            .add_method(
                "get_Name",
                public_method(),
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::constant("x")),
            )
            .unwrap();
        let static_setter = ty
            .add_method(
                "set_Name",
                public_method() | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::Void, vec![TypeSignature::String]),
                Some(Expr::empty()),
            )
            .unwrap();
        assert!(matches!(
            ty.add_property("Name", TypeSignature::I4, Some(getter), None),
            Err(Error::Argument { .. })
        ));
        assert!(matches!(
            ty.add_property("Name", TypeSignature::String, Some(getter), Some(static_setter)),
            Err(Error::Argument { .. })
        ));
        ty.add_property("Name", TypeSignature::String, Some(getter), None)
            .unwrap();
        assert_eq!(ty.properties().len(), 1);

        let auto = ty
            .add_auto_property("Count", TypeSignature::I4, MemberAccess::Public)
            .unwrap();
        let auto = ty.property(auto).unwrap();
        assert!(auto.getter().is_some() && auto.setter().is_some());
        assert!(ty.find_field("<Count>k__BackingField").is_some());
    }

    #[test]
    fn test_override_is_idempotent_per_chain() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena.create_proxy(&dog, "Dog_Proxy_1");
        let proxy = arena.type_mut(handle).unwrap();

        let base_speak = animal.find_method_by_name("Speak").unwrap();
        let dog_speak = dog.find_method_by_name("Speak").unwrap();
        let (first, created) = proxy.get_or_add_override(&dog_speak).unwrap();
        assert!(created);
        let (second, created) = proxy.get_or_add_override(&base_speak).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let method = proxy.method(first).unwrap();
        assert!(method.is_virtual());
        assert!(!method.is_abstract());
        assert!(!method.flags().contains(MethodAttributes::NEW_SLOT));
        assert!(proxy.is_modified());
    }

    #[test]
    fn test_override_of_abstract_method_is_abstract() {
        let registry = registry();
        let (animal, _, _) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena.create_proxy(&animal, "Animal_Proxy_1");
        let proxy = arena.type_mut(handle).unwrap();

        let speak = animal.find_method_by_name("Speak").unwrap();
        let (method, _) = proxy.get_or_add_override(&speak).unwrap();
        assert!(proxy.method(method).unwrap().body().is_none());
        assert!(proxy.is_abstract());

        proxy
            .set_method_body(method, Expr::constant("generated"))
            .unwrap();
        assert!(!proxy.is_abstract());
    }

    #[test]
    fn test_override_rejects_final_and_non_virtual() {
        let registry = registry();
        let base = ClassBuilder::new("App", "Locked")
            .public()
            .default_constructor()
            .method("Plain", |m| m.public().body(Expr::empty()))
            .method("Sealed", |m| m.public().virtual_().final_().body(Expr::empty()))
            .build(&registry)
            .unwrap();
        let mut arena = TypeArena::new();
        let handle = arena.create_proxy(&base, "Locked_Proxy_1");
        let proxy = arena.type_mut(handle).unwrap();

        let plain = base.find_method_by_name("Plain").unwrap();
        let sealed = base.find_method_by_name("Sealed").unwrap();
        assert!(matches!(
            proxy.get_or_add_override(&plain),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            proxy.get_or_add_override(&sealed),
            Err(Error::NotSupported(_))
        ));
        assert!(!proxy.is_modified());
    }

    #[test]
    fn test_implementation_creates_abstract_method() {
        let registry = registry();
        let (_, _, speaker) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Parrot", TypeAttributes::PUBLIC, None)
            .unwrap();
        let ty = arena.type_mut(handle).unwrap();

        let speak = speaker.find_method_by_name("Speak").unwrap();
        assert!(matches!(
            ty.get_or_add_implementation(&speak),
            Err(Error::Argument { .. })
        ));

        ty.add_interface(&speaker, false).unwrap();
        assert!(ty.is_abstract());
        assert!(matches!(
            ty.add_interface(&speaker, false),
            Err(Error::InvalidOperation(_))
        ));
        ty.add_interface(&speaker, true).unwrap();
        assert_eq!(ty.interfaces().len(), 1);

        let (method, created) = ty.get_or_add_implementation(&speak).unwrap();
        assert!(created);
        assert_eq!(ty.method(method).unwrap().explicit_overrides().len(), 1);
        let (again, created) = ty.get_or_add_implementation(&speak).unwrap();
        assert!(!created);
        assert_eq!(method, again);

        ty.set_method_body(method, Expr::constant("hello")).unwrap();
        assert!(!ty.is_abstract());
    }

    #[test]
    fn test_implementation_overrides_base_implementation() {
        let registry = registry();
        let (_, dog, speaker) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena.create_proxy(&dog, "Dog_Proxy_1");
        let proxy = arena.type_mut(handle).unwrap();

        let speak = speaker.find_method_by_name("Speak").unwrap();
        let (implementation, created) = proxy.get_or_add_implementation(&speak).unwrap();
        assert!(created);
        let dog_speak = dog.find_method_by_name("Speak").unwrap();
        let (override_, created) = proxy.get_or_add_override(&dog_speak).unwrap();
        assert!(!created);
        assert_eq!(implementation, override_);
    }

    #[test]
    fn test_add_interface_rejects_classes() {
        let registry = registry();
        let (animal, _, _) = animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Thing", TypeAttributes::PUBLIC, None)
            .unwrap();
        assert!(matches!(
            arena.type_mut(handle).unwrap().add_interface(&animal, false),
            Err(Error::Argument { .. })
        ));
    }

    #[test]
    fn test_nested_and_batch_interfaces() {
        let mut arena = TypeArena::new();
        let outer = arena
            .create_type("App", "Outer", TypeAttributes::PUBLIC, None)
            .unwrap();
        let inner = arena
            .add_nested_type(outer, "Inner", TypeAttributes::PUBLIC, None)
            .unwrap();
        let contract = arena.create_interface("App", "IContract").unwrap();

        assert_eq!(arena.fullname(inner), "App.Outer+Inner");
        assert_eq!(
            arena.get(inner).unwrap().flags().visibility(),
            TypeAttributes::NESTED_PUBLIC.bits()
        );
        assert_eq!(arena.get(outer).unwrap().nested_types(), &[inner]);

        arena.add_batch_interface(inner, contract).unwrap();
        assert!(matches!(
            arena.add_batch_interface(inner, contract),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            arena.add_batch_interface(contract, outer),
            Err(Error::Argument { .. })
        ));
    }

    #[test]
    fn test_unimplemented_batch_interface_is_abstract() {
        let mut arena = TypeArena::new();
        let shape = arena.create_interface("App", "IShape").unwrap();
        let signature = MethodSignature::new(TypeSignature::R8, vec![]);
        arena
            .type_mut(shape)
            .unwrap()
            .add_method(
                "Area",
                public_method()
                    | MethodAttributes::VIRTUAL
                    | MethodAttributes::ABSTRACT
                    | MethodAttributes::NEW_SLOT,
                signature.clone(),
                None,
            )
            .unwrap();
        let circle = arena
            .create_type("App", "Circle", TypeAttributes::PUBLIC, None)
            .unwrap();
        arena.add_batch_interface(circle, shape).unwrap();

        assert!(!arena.get(circle).unwrap().is_abstract());
        assert!(arena.is_abstract(circle).unwrap());

        arena
            .type_mut(circle)
            .unwrap()
            .add_method(
                "Area",
                public_method() | MethodAttributes::VIRTUAL,
                signature,
                Some(Expr::constant(3.0)),
            )
            .unwrap();
        assert!(!arena.is_abstract(circle).unwrap());
        assert!(arena.is_abstract(shape).unwrap());
    }

    #[test]
    fn test_sealed_descriptor_rejects_mutation() {
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Frozen", TypeAttributes::PUBLIC, None)
            .unwrap();
        arena.seal_all();

        let result = arena.type_mut(handle).unwrap().add_field(
            "late",
            TypeSignature::I4,
            FieldAttributes::PUBLIC,
        );
        assert!(matches!(result, Err(Error::DescriptorSealed(name)) if name == "App.Frozen"));
    }

    #[test]
    fn test_invalid_base_types() {
        let registry = registry();
        let sealed = ClassBuilder::new("App", "Final")
            .public()
            .sealed()
            .build(&registry)
            .unwrap();
        let mut arena = TypeArena::new();

        assert!(matches!(
            arena.create_type(
                "App",
                "Derived",
                TypeAttributes::PUBLIC,
                Some(TypeSignature::class(&sealed))
            ),
            Err(Error::Argument { .. })
        ));
        assert!(matches!(
            arena.create_type("App", "Number", TypeAttributes::PUBLIC, Some(TypeSignature::I4)),
            Err(Error::Argument { .. })
        ));
    }
}
