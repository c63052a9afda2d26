//! Per-descriptor code generation state machine.

use strum::Display;
use tracing::trace;

use crate::{
    codegen::{
        lowering::{lower_expr, lower_signature, lower_type, resolve_type},
        BuilderMap, CodeGenerationContext, CodeGenerator, EmittableMemberMap,
    },
    model::{MethodHandle, MethodSlot, MutableMethod, TypeArena, TypeHandle},
    runtime::{Expr, MethodRc, TypeAttributes, TypeRc, TypeRegistry},
    Result,
};

/// Progress of one descriptor through code generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BuildPhase {
    /// Nothing emitted yet
    Pending,
    /// The empty type handle exists
    Declared,
    /// Base type, interfaces and members are emitted; bodies may still be queued
    Defined,
    /// The type is created and loadable
    Finalized,
}

/// Emits one descriptor through a [`CodeGenerator`], phase by phase
pub(crate) struct MutableTypeCodeGenerator {
    handle: TypeHandle,
    phase: BuildPhase,
}

impl MutableTypeCodeGenerator {
    pub(crate) fn new(handle: TypeHandle) -> Self {
        MutableTypeCodeGenerator {
            handle,
            phase: BuildPhase::Pending,
        }
    }

    pub(crate) fn handle(&self) -> TypeHandle {
        self.handle
    }

    pub(crate) fn phase(&self) -> BuildPhase {
        self.phase
    }

    fn advance(&mut self, expected: BuildPhase, next: BuildPhase) -> Result<()> {
        if self.phase != expected {
            return Err(invalid_operation!(
                "Cannot enter phase {} for {:?} while in phase {}",
                next,
                self.handle,
                self.phase
            ));
        }
        self.phase = next;
        Ok(())
    }

    /// Declares the empty type. Enclosing types must be declared first.
    pub(crate) fn declare(
        &mut self,
        arena: &TypeArena,
        context: &mut CodeGenerationContext,
        code_generator: &mut dyn CodeGenerator,
    ) -> Result<()> {
        self.advance(BuildPhase::Pending, BuildPhase::Declared)?;
        let ty = arena.type_ref(self.handle)?;

        let mut flags = ty.flags();
        if arena.is_abstract(self.handle)? {
            flags |= TypeAttributes::ABSTRACT;
        }
        let declaring = ty
            .declaring_type()
            .map(|outer| context.members.get_type(outer))
            .transpose()?;

        let builder = code_generator.define_type(ty.namespace(), ty.name(), flags, declaring.as_ref())?;
        context
            .members
            .add_type(self.handle, builder.runtime_type().clone())?;
        context.builders.insert(self.handle, builder);
        trace!(ty = %arena.fullname(self.handle), "declared");
        Ok(())
    }

    /// Emits base type, interfaces, attributes and members, and queues bodies and
    /// explicit overrides. Every type of the batch must be declared.
    pub(crate) fn define(
        &mut self,
        arena: &TypeArena,
        registry: &TypeRegistry,
        context: &mut CodeGenerationContext,
    ) -> Result<()> {
        self.advance(BuildPhase::Declared, BuildPhase::Defined)?;
        let ty = arena.type_ref(self.handle)?;
        let CodeGenerationContext {
            members, builders, ..
        } = &mut *context;
        let builder = builders
            .get_mut(&self.handle)
            .ok_or_else(|| invalid_operation!("{:?} has not been declared", self.handle))?;

        match ty.base() {
            Some(base) => builder.set_parent(&resolve_type(base, members)?)?,
            None if !ty.is_interface() => builder.set_parent(&registry.core().object)?,
            None => {}
        }
        for interface in ty.interfaces() {
            builder.add_interface_implementation(&resolve_type(interface, members)?)?;
        }
        for attribute in ty.custom_attributes() {
            builder.set_custom_attribute(attribute.to_runtime())?;
        }

        for field in ty.fields() {
            let emitted = builder.define_field(
                field.name(),
                lower_type(field.signature(), members)?,
                field.flags(),
            )?;
            for attribute in field.custom_attributes() {
                emitted.custom_attributes.push(attribute.to_runtime());
            }
            members.add_field(field.handle(), emitted)?;
        }

        let mut bodies: Vec<(MethodRc, Expr)> = Vec::new();
        let mut overrides: Vec<(MethodRc, MethodRc)> = Vec::new();

        for ctor in ty.constructors() {
            let emitted =
                builder.define_constructor(ctor.flags(), lower_signature(ctor.signature(), members)?)?;
            register_method(ctor, &emitted, members)?;
            let mut body: Vec<Expr> = ty.initializations().to_vec();
            body.extend(ctor.body().cloned());
            bodies.push((emitted, Expr::Block(body)));
        }

        if ty.type_initializer().is_some() || !ty.type_initializations().is_empty() {
            let emitted = builder.define_type_initializer()?;
            let mut body: Vec<Expr> = ty.type_initializations().to_vec();
            match ty.type_initializer() {
                Some(initializer) => {
                    register_method(initializer, &emitted, members)?;
                    body.extend(initializer.body().cloned());
                }
                None => members.add_method(
                    MethodHandle {
                        owner: self.handle,
                        slot: MethodSlot::TypeInitializer,
                    },
                    emitted.clone(),
                )?,
            }
            bodies.push((emitted, Expr::Block(body)));
        }

        for method in ty.methods() {
            let emitted = builder.define_method(
                method.name(),
                method.flags(),
                lower_signature(method.signature(), members)?,
            )?;
            register_method(method, &emitted, members)?;
            if let Some(body) = method.body() {
                bodies.push((emitted.clone(), body.clone()));
            }
            for declaration in method.base_method().into_iter().chain(method.explicit_overrides()) {
                overrides.push((emitted.clone(), declaration.clone()));
            }
        }

        for property in ty.properties() {
            let getter = property
                .getter()
                .map(|handle| members.get_method(handle))
                .transpose()?;
            let setter = property
                .setter()
                .map(|handle| members.get_method(handle))
                .transpose()?;
            let emitted = builder.define_property(
                property.name(),
                lower_type(property.signature(), members)?,
                getter,
                setter,
            )?;
            members.add_property(property.handle(), emitted)?;
        }

        for event in ty.events() {
            let raise = event
                .raise_method()
                .map(|handle| members.get_method(handle))
                .transpose()?;
            let emitted = builder.define_event(
                event.name(),
                lower_type(event.event_type(), members)?,
                members.get_method(event.add_method())?,
                members.get_method(event.remove_method())?,
                raise,
            )?;
            members.add_event(event.handle(), emitted)?;
        }

        let owner = self.handle;
        for (method, body) in bodies {
            context.post_declaration(Box::new(move |members: &EmittableMemberMap, builders: &mut BuilderMap| {
                let lowered = lower_expr(&body, members)?;
                builders
                    .get_mut(&owner)
                    .ok_or_else(|| invalid_operation!("{:?} has not been declared", owner))?
                    .set_method_body(&method, lowered)
            }));
        }
        for (body, declaration) in overrides {
            context.post_declaration(Box::new(move |_: &EmittableMemberMap, builders: &mut BuilderMap| {
                builders
                    .get_mut(&owner)
                    .ok_or_else(|| invalid_operation!("{:?} has not been declared", owner))?
                    .define_method_override(&body, &declaration)
            }));
        }

        trace!(
            ty = %arena.fullname(self.handle),
            queued = context.pending_actions(),
            "defined"
        );
        Ok(())
    }

    /// Creates the loadable type. Post-declaration actions must have run.
    pub(crate) fn finalize(&mut self, context: &mut CodeGenerationContext) -> Result<TypeRc> {
        self.advance(BuildPhase::Defined, BuildPhase::Finalized)?;
        context.builder(self.handle)?.create_type()
    }
}

fn register_method(
    method: &MutableMethod,
    emitted: &MethodRc,
    members: &mut EmittableMemberMap,
) -> Result<()> {
    for attribute in method.custom_attributes() {
        emitted.custom_attributes.push(attribute.to_runtime());
    }
    members.add_method(method.handle(), emitted.clone())
}
