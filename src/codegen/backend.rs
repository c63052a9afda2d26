//! Type construction backend.
//!
//! The code generator drives a backend through three steps per type: [`CodeGenerator::define_type`]
//! declares an empty handle, the [`TypeBuilder`] define operations attach the base type,
//! interfaces and members, and [`TypeBuilder::create_type`] seals the handle into a loadable
//! type. Everything the generator knows about the concrete type system goes through these
//! two traits.

use std::path::PathBuf;

use uguid::Guid;

use crate::{
    runtime::{
        CustomAttribute, EventRc, Expr, FieldAttributes, FieldRc, MethodAttributes, MethodRc,
        MethodSignature, PropertyRc, TypeAttributes, TypeRc, TypeSignature,
    },
    Result,
};

/// One module-construction scope of a backend.
///
/// A generator is used by one thread at a time; the pipeline hands it out through
/// [`crate::sync::ModuleContextPool`].
pub trait CodeGenerator: Send {
    /// Unique id of the module currently being built
    fn module_id(&self) -> Guid;

    /// Name of the module currently being built
    fn module_name(&self) -> String;

    /// Declares an empty type. `declaring` is the enclosing type of nested types, which must
    /// have been declared before.
    ///
    /// # Errors
    /// Returns an error if the backend cannot declare the type.
    fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        declaring: Option<&TypeRc>,
    ) -> Result<Box<dyn TypeBuilder>>;

    /// Writes every finished type of the current module to an artifact and starts a new
    /// module. Returns `None` if the module holds no finished type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Persistence`] or [`crate::Error::FileError`] if the artifact
    /// cannot be written.
    fn flush(&mut self, participant_configuration_id: &str) -> Result<Option<PathBuf>>;

    /// Finished types of the current module, in creation order
    fn generated_types(&self) -> Vec<TypeRc>;
}

/// Builder for one declared type
pub trait TypeBuilder: Send {
    /// The declared, not yet finished runtime type
    fn runtime_type(&self) -> &TypeRc;

    /// Sets the base type
    ///
    /// # Errors
    /// Returns an error if the base was already set or cannot be derived from.
    fn set_parent(&mut self, base: &TypeRc) -> Result<()>;

    /// Adds an interface implementation
    ///
    /// # Errors
    /// Returns an error if `interface` is not an interface.
    fn add_interface_implementation(&mut self, interface: &TypeRc) -> Result<()>;

    /// Applies a custom attribute to the type
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn set_custom_attribute(&mut self, attribute: CustomAttribute) -> Result<()>;

    /// Defines a field
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn define_field(
        &mut self,
        name: &str,
        signature: TypeSignature,
        flags: FieldAttributes,
    ) -> Result<FieldRc>;

    /// Defines an instance constructor
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn define_constructor(
        &mut self,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> Result<MethodRc>;

    /// Defines the type initializer
    ///
    /// # Errors
    /// Returns an error if the type already has one.
    fn define_type_initializer(&mut self) -> Result<MethodRc>;

    /// Defines a method
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn define_method(
        &mut self,
        name: &str,
        flags: MethodAttributes,
        signature: MethodSignature,
    ) -> Result<MethodRc>;

    /// Sets the body of a method defined by this builder
    ///
    /// # Errors
    /// Returns an error if the method is abstract, belongs to another type or already has
    /// a body.
    fn set_method_body(&mut self, method: &MethodRc, body: Expr) -> Result<()>;

    /// Makes `body` implement the slot of `declaration` explicitly
    ///
    /// # Errors
    /// Returns an error if `body` belongs to another type.
    fn define_method_override(&mut self, body: &MethodRc, declaration: &MethodRc) -> Result<()>;

    /// Defines a property over defined accessors
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn define_property(
        &mut self,
        name: &str,
        signature: TypeSignature,
        getter: Option<MethodRc>,
        setter: Option<MethodRc>,
    ) -> Result<PropertyRc>;

    /// Defines an event over defined accessors
    ///
    /// # Errors
    /// Returns an error if the type is already finished.
    fn define_event(
        &mut self,
        name: &str,
        event_type: TypeSignature,
        add_method: MethodRc,
        remove_method: MethodRc,
        raise_method: Option<MethodRc>,
    ) -> Result<EventRc>;

    /// Seals the type and makes it loadable
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if the type was already created or a
    /// non-abstract method has no body.
    fn create_type(&mut self) -> Result<TypeRc>;
}
