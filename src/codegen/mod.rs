//! Code generation for descriptor batches.
//!
//! [`generate_types`] turns a [`TypeArena`] into real runtime types in three passes over the
//! dependency-sorted batch:
//!
//! 1. **Declare** every type, so each one has a handle before any member refers to it
//! 2. **Define** base types, interfaces, attributes and members; bodies and explicit
//!    overrides are queued as post-declaration actions
//! 3. **Finalize**: run the queued actions, lowering descriptor references to the emitted
//!    members, then create every type
//!
//! Types of one batch may therefore refer to each other freely, including calls between
//! methods of mutually dependent types.
//!
//! # Key Components
//!
//! - [`CodeGenerator`] / [`TypeBuilder`]: The backend interface
//! - [`RuntimeCodeGenerator`]: Backend building [`crate::runtime::RuntimeType`]s
//! - [`DependentTypeSorter`]: Declaration order of a batch
//! - [`GeneratedTypesContext`]: Lookup of the generated members by descriptor handle
//! - [`persist`]: Module artifacts written by [`CodeGenerator::flush`]

mod backend;
mod context;
mod generator;
mod lowering;
pub mod persist;
mod runtime_backend;
mod sorter;

use tracing::debug;

pub use backend::{CodeGenerator, TypeBuilder};
pub use context::{EmittableMemberMap, GeneratedTypesContext};
pub use generator::BuildPhase;
pub use runtime_backend::{
    ModuleNaming, RuntimeCodeGenerator, RuntimeTypeBuilder, MODULE_COUNTER_PLACEHOLDER,
};
pub use sorter::DependentTypeSorter;

pub(crate) use context::{BuilderMap, CodeGenerationContext};
pub(crate) use generator::MutableTypeCodeGenerator;

use crate::{model::TypeArena, runtime::TypeRegistry, Result};

/// Generates every descriptor of `arena` through `code_generator`.
///
/// The arena is sealed first; later mutations fail with
/// [`crate::Error::DescriptorSealed`].
///
/// # Errors
/// Returns [`crate::Error::InvalidOperation`] for cyclic base, enclosing-type or interface
/// references and any error raised by the backend.
pub fn generate_types(
    arena: &mut TypeArena,
    registry: &TypeRegistry,
    code_generator: &mut dyn CodeGenerator,
) -> Result<GeneratedTypesContext> {
    arena.seal_all();
    let order = DependentTypeSorter::sort(arena)?;

    let mut context = CodeGenerationContext::new();
    let mut generators: Vec<MutableTypeCodeGenerator> = order
        .into_iter()
        .map(MutableTypeCodeGenerator::new)
        .collect();

    for generator in &mut generators {
        generator.declare(arena, &mut context, code_generator)?;
    }
    for generator in &mut generators {
        generator.define(arena, registry, &mut context)?;
    }
    context.run_post_declaration_actions()?;

    let mut types = Vec::with_capacity(generators.len());
    for generator in &mut generators {
        types.push((generator.handle(), generator.finalize(&mut context)?));
    }

    debug!(
        module = %code_generator.module_name(),
        types = types.len(),
        "generated descriptor batch"
    );
    Ok(GeneratedTypesContext::new(context.into_members(), types))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::MethodSlot,
        runtime::{
            BinaryOp, Expr, FieldAttributes, MethodAttributes, MethodSignature,
            ParameterDeclaration, TypeAttributes, TypeSignature, Value,
        },
        test::fixtures::{greeter_base, registry},
        Error,
    };

    fn code_generator(registry: &Arc<TypeRegistry>) -> RuntimeCodeGenerator {
        RuntimeCodeGenerator::new(registry.clone(), ModuleNaming::new(None, "Batch.{counter}"))
    }

    #[test]
    fn test_mutually_referencing_types_call_each_other() {
        let registry = Arc::new(registry());
        let mut arena = TypeArena::new();
        let ping = arena
            .create_type("App", "Ping", TypeAttributes::PUBLIC, None)
            .unwrap();
        let pong = arena
            .create_type("App", "Pong", TypeAttributes::PUBLIC, None)
            .unwrap();

        let pong_name = arena
            .type_mut(pong)
            .unwrap()
            .add_method(
                "Name",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::constant("pong")),
            )
            .unwrap();
        let ping_name = arena
            .type_mut(ping)
            .unwrap()
            .add_method(
                "Name",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::binary(
                    BinaryOp::Concat,
                    Expr::constant("ping-"),
                    Expr::call_static(pong_name, vec![]),
                )),
            )
            .unwrap();
        arena
            .type_mut(pong)
            .unwrap()
            .add_method(
                "Echo",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::call_static(ping_name, vec![])),
            )
            .unwrap();
        arena
            .type_mut(ping)
            .unwrap()
            .add_field("partner", TypeSignature::Mutable(pong), FieldAttributes::PUBLIC)
            .unwrap();

        let mut code_generator = code_generator(&registry);
        let generated = generate_types(&mut arena, &registry, &mut code_generator).unwrap();

        assert_eq!(generated.len(), 2);
        let echo = generated.get_type(pong).unwrap().method("Echo").unwrap();
        assert_eq!(echo.invoke(None, &[]).unwrap().as_str(), Some("ping-pong"));

        let partner = generated.get_type(ping).unwrap().field("partner").unwrap();
        let pong_type = generated.get_type(pong).unwrap();
        assert_eq!(
            partner.signature.runtime_type().unwrap().token,
            pong_type.token
        );
        assert!(registry.contains_fullname("App.Ping"));
    }

    #[test]
    fn test_initializations_run_before_constructor_body() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let mut arena = TypeArena::new();
        let proxy = arena.create_proxy(&base, "Base_Proxy_1");
        let ty = arena.type_mut(proxy).unwrap();
        let field = ty
            .add_field("greeting", TypeSignature::String, FieldAttributes::PRIVATE)
            .unwrap();
        ty.add_initialization(Expr::store_this_field(field, Expr::constant("hello")))
            .unwrap();
        let (greet, _) = ty
            .get_or_add_override(&base.method("Greet").unwrap())
            .unwrap();
        ty.set_method_body(greet, Expr::load_this_field(field)).unwrap();
        ty.add_constructor(
            MethodAttributes::PUBLIC,
            vec![ParameterDeclaration::new("suffix", TypeSignature::String)],
            Expr::store_this_field(
                field,
                Expr::binary(
                    BinaryOp::Concat,
                    Expr::load_this_field(field),
                    Expr::Argument(0),
                ),
            ),
        )
        .unwrap();

        let mut code_generator = code_generator(&registry);
        let generated = generate_types(&mut arena, &registry, &mut code_generator).unwrap();
        let proxy_type = generated.get_type(proxy).unwrap();

        let plain = proxy_type.create_instance(&[]).unwrap();
        assert_eq!(plain.call("Greet", &[]).unwrap().as_str(), Some("hello"));
        let suffixed = proxy_type
            .create_instance(&[Value::from(" world")])
            .unwrap();
        assert_eq!(
            suffixed.call("Greet", &[]).unwrap().as_str(),
            Some("hello world")
        );
    }

    #[test]
    fn test_type_initializations_create_initializer() {
        let registry = Arc::new(registry());
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Counter", TypeAttributes::PUBLIC, None)
            .unwrap();
        let ty = arena.type_mut(handle).unwrap();
        let field = ty
            .add_field(
                "start",
                TypeSignature::I4,
                FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            )
            .unwrap();
        ty.add_type_initialization(Expr::store_static(field, Expr::constant(7)))
            .unwrap();
        let read = ty
            .add_method(
                "Start",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::I4, vec![]),
                Some(Expr::load_static(field)),
            )
            .unwrap();

        let mut code_generator = code_generator(&registry);
        let generated = generate_types(&mut arena, &registry, &mut code_generator).unwrap();

        let initializer = generated
            .get_method(crate::model::MethodHandle {
                owner: handle,
                slot: MethodSlot::TypeInitializer,
            })
            .unwrap();
        assert!(initializer.is_static());
        let start = generated.get_method(read).unwrap();
        assert_eq!(start.invoke(None, &[]).unwrap().as_i4(), Some(7));
    }

    #[test]
    fn test_batch_is_sealed_after_generation() {
        let registry = Arc::new(registry());
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Sealed", TypeAttributes::PUBLIC, None)
            .unwrap();

        let mut code_generator = code_generator(&registry);
        generate_types(&mut arena, &registry, &mut code_generator).unwrap();

        assert!(matches!(
            arena.type_mut(handle).unwrap().add_field(
                "late",
                TypeSignature::I4,
                FieldAttributes::PUBLIC
            ),
            Err(Error::DescriptorSealed(_))
        ));
    }

    #[test]
    fn test_unimplemented_interface_makes_type_abstract() {
        let registry = Arc::new(registry());
        let (_, _, speaker) = crate::test::fixtures::animal_hierarchy(&registry);
        let mut arena = TypeArena::new();
        let handle = arena
            .create_type("App", "Mute", TypeAttributes::PUBLIC, None)
            .unwrap();
        arena
            .type_mut(handle)
            .unwrap()
            .add_interface(&speaker, false)
            .unwrap();

        let mut code_generator = code_generator(&registry);
        let generated = generate_types(&mut arena, &registry, &mut code_generator).unwrap();
        let mute = generated.get_type(handle).unwrap();

        assert!(mute.is_abstract());
        assert!(mute.implements(&speaker));
        assert!(matches!(
            mute.create_instance(&[]),
            Err(Error::AbstractInstantiation(_)) | Err(Error::MissingMember { .. })
        ));
    }
}
