//! Per-request orchestration of participants.
//!
//! The [`TypeAssembler`] turns one [`AssembledTypeId`] into a generated type: it creates the
//! proxy descriptor deriving from the requested type, lets every [`Participant`] edit the
//! batch, stamps the identifier into the proxy and hands the batch to
//! [`crate::codegen::generate_types`]. Requests no participant modifies never reach code
//! generation; the requested type itself is returned.
//!
//! # Key Components
//!
//! - [`Participant`]: The extension point
//! - [`ParticipantState`]: Per-request store shared by all participants
//! - [`ProxyTypeAssemblyContext`] / [`AdditionalTypeAssemblyContext`]: Views of a batch
//! - [`TypeAssembler`]: The orchestrator

mod context;
mod participant;

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::debug;

pub use context::{
    AdditionalTypeAssemblyContext, GenerationCompletedCallback, ProxyTypeAssemblyContext,
    TypeAssemblyContext,
};
pub use participant::{
    AdditionalType, LoadedProxyType, LoadedTypesContext, Participant, ParticipantState,
};

use crate::{
    codegen::{generate_types, CodeGenerator, GeneratedTypesContext},
    identity::{AssembledTypeId, IdPart, IdentifierProvider},
    model::{CustomAttributeDeclaration, TypeArena},
    runtime::{
        interpreter::Interpreter, Expr, FieldAttributes, TypeRc, TypeRegistry, TypeSignature,
        Value,
    },
    Error, Result,
};

/// Name of the static field holding the identifier of a generated proxy
pub const TYPE_ID_FIELD_NAME: &str = "__typeID";

/// Orchestrates participants and code generation for single requests
pub struct TypeAssembler {
    configuration_id: String,
    participants: Vec<Arc<dyn Participant>>,
    identifier_provider: IdentifierProvider,
    registry: Arc<TypeRegistry>,
    counter: AtomicU64,
}

impl TypeAssembler {
    /// Creates an assembler for `participants`, run in the given order.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for an empty configuration id or duplicate
    /// participant names.
    pub fn new(
        configuration_id: impl Into<String>,
        participants: Vec<Arc<dyn Participant>>,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let configuration_id = configuration_id.into();
        if configuration_id.is_empty() {
            return Err(Error::Configuration(
                "Participant configuration id must not be empty".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for participant in &participants {
            if !names.insert(participant.name()) {
                return Err(Error::Configuration(format!(
                    "Participant '{}' is registered more than once",
                    participant.name()
                )));
            }
        }

        let identifier_provider = IdentifierProvider::new(&participants);
        Ok(TypeAssembler {
            configuration_id,
            participants,
            identifier_provider,
            registry,
            counter: AtomicU64::new(0),
        })
    }

    /// Identifies the participant configuration in flushed modules
    pub fn participant_configuration_id(&self) -> &str {
        &self.configuration_id
    }

    /// The participants in execution order
    pub fn participants(&self) -> &[Arc<dyn Participant>] {
        &self.participants
    }

    /// Names of the participants in execution order
    pub fn participant_names(&self) -> Vec<String> {
        self.participants
            .iter()
            .map(|participant| participant.name().to_string())
            .collect()
    }

    /// The identifier provider built from the participants
    pub fn identifier_provider(&self) -> &IdentifierProvider {
        &self.identifier_provider
    }

    /// The registry generated types are registered in
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Computes the identifier of a request for `requested`
    pub fn compute_type_id(&self, requested: &TypeRc) -> AssembledTypeId {
        self.identifier_provider.get_identifier(requested)
    }

    /// Returns true if a proxy deriving from `requested` can be generated
    pub fn is_subclassable(requested: &TypeRc) -> bool {
        if requested.is_sealed() || requested.is_interface() || !is_visible(requested) {
            return false;
        }
        requested
            .constructor_list()
            .iter()
            .any(|ctor| ctor.access().is_accessible_from_subclass())
    }

    /// Generates the type for `id`.
    ///
    /// Returns the requested type itself if it cannot be derived from or if no participant
    /// changed the proxy.
    ///
    /// # Errors
    /// Any participant or code generation error, augmented with the requested type name
    /// and the participant list (see [`Error::with_assembly_context`]).
    pub fn assemble_type(
        &self,
        id: &AssembledTypeId,
        state: &mut ParticipantState,
        code_generator: &mut dyn CodeGenerator,
    ) -> Result<TypeRc> {
        let requested = id.requested_type();
        if !Self::is_subclassable(requested) {
            debug!(requested = %requested.fullname(), "requested type is not subclassable");
            for participant in &self.participants {
                participant.handle_non_subclassable_type(requested)?;
            }
            return Ok(requested.clone());
        }

        self.assemble_proxy(id, state, code_generator)
            .map_err(|error| error.with_assembly_context(&requested.fullname(), &self.participant_names()))
    }

    fn assemble_proxy(
        &self,
        id: &AssembledTypeId,
        state: &mut ParticipantState,
        code_generator: &mut dyn CodeGenerator,
    ) -> Result<TypeRc> {
        let requested = id.requested_type();
        let mut arena = TypeArena::new();
        let proxy = arena.create_proxy(requested, &self.next_proxy_name(requested));

        let mut context =
            ProxyTypeAssemblyContext::new(TypeAssemblyContext::new(&self.registry, arena), id, proxy);
        for (index, participant) in self.participants.iter().enumerate() {
            context.participant_index = index;
            participant.participate(state, &mut context)?;
        }

        if !context.arena().is_modified() {
            debug!(requested = %requested.fullname(), "no participant modified the proxy");
            return Ok(requested.clone());
        }

        let proxy_type = context.proxy_mut()?;
        let field = proxy_type.add_field(
            TYPE_ID_FIELD_NAME,
            TypeSignature::Object,
            FieldAttributes::PRIVATE | FieldAttributes::STATIC | FieldAttributes::INIT_ONLY,
        )?;
        proxy_type.add_type_initialization(Expr::store_static(
            field,
            self.identifier_provider.get_expression(id),
        ))?;
        proxy_type.add_custom_attribute(CustomAttributeDeclaration::new(
            &self.registry.core().assembled_type_attribute_constructor()?,
            vec![],
            vec![],
        )?)?;

        let (mut arena, callbacks) = context.into_inner().into_parts();
        let generated = generate_types(&mut arena, &self.registry, code_generator)?;
        run_callbacks(callbacks, &generated)?;

        let proxy_type = generated.get_type(proxy)?;
        debug!(
            requested = %requested.fullname(),
            generated = %proxy_type.fullname(),
            batch = generated.len(),
            "assembled type"
        );
        Ok(proxy_type)
    }

    /// Generates or looks up the additional type identified by `additional_id`.
    ///
    /// Participants are asked in order; the first one answering wins.
    ///
    /// # Errors
    /// Returns [`Error::NotSupported`] if no participant knows the identifier, and any
    /// participant or code generation error with the identifier as context.
    pub fn assemble_additional_type(
        &self,
        additional_id: &IdPart,
        state: &mut ParticipantState,
        code_generator: &mut dyn CodeGenerator,
    ) -> Result<TypeRc> {
        self.assemble_additional(additional_id, state, code_generator)
            .map_err(|error| {
                error.with_assembly_context(&additional_id.to_string(), &self.participant_names())
            })
    }

    fn assemble_additional(
        &self,
        additional_id: &IdPart,
        state: &mut ParticipantState,
        code_generator: &mut dyn CodeGenerator,
    ) -> Result<TypeRc> {
        let mut context = AdditionalTypeAssemblyContext::new(
            TypeAssemblyContext::new(&self.registry, TypeArena::new()),
            additional_id,
        );

        for participant in &self.participants {
            match participant.get_or_create_additional_type(additional_id, state, &mut context)? {
                Some(AdditionalType::Existing(ty)) => return Ok(ty),
                Some(AdditionalType::Created(handle)) => {
                    let (mut arena, callbacks) = context.into_inner().into_parts();
                    let generated = generate_types(&mut arena, &self.registry, code_generator)?;
                    run_callbacks(callbacks, &generated)?;
                    let ty = generated.get_type(handle)?;
                    debug!(
                        id = %additional_id,
                        participant = participant.name(),
                        generated = %ty.fullname(),
                        "assembled additional type"
                    );
                    return Ok(ty);
                }
                None => {}
            }
        }

        Err(not_supported!(
            "No participant provides an additional type for identifier {}",
            additional_id
        ))
    }

    /// Hands types loaded from flushed modules to every participant
    ///
    /// # Errors
    /// Returns the first participant error.
    pub fn rebuild_participant_state(&self, loaded: &LoadedTypesContext) -> Result<()> {
        for participant in &self.participants {
            participant.rebuild_state(loaded)?;
        }
        Ok(())
    }

    /// The identifier the participants map a loaded additional type to, if any
    pub fn get_additional_type_id(&self, loaded: &TypeRc) -> Option<IdPart> {
        self.participants
            .iter()
            .find_map(|participant| participant.additional_type_id(loaded))
    }

    /// Returns true if `ty` is a proxy generated by an assembler
    pub fn is_assembled_type(&self, ty: &TypeRc) -> bool {
        !ty.custom_attributes_of(&self.registry.core().assembled_type_attribute)
            .is_empty()
    }

    /// The requested type a proxy was generated for
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `assembled` is not a generated proxy.
    pub fn get_requested_type(&self, assembled: &TypeRc) -> Result<TypeRc> {
        if !self.is_assembled_type(assembled) {
            return Err(argument_error!(
                "assembled",
                "'{}' is not an assembled type",
                assembled.fullname()
            ));
        }
        assembled.base().ok_or_else(|| {
            argument_error!("assembled", "'{}' has no base type", assembled.fullname())
        })
    }

    /// Reads the identifier stamped into a generated proxy, running its type initializer
    /// if it has not run yet
    ///
    /// # Errors
    /// Returns [`Error::Argument`] if `assembled` is not a generated proxy and any error
    /// raised by the type initializer.
    pub fn extract_type_id(&self, assembled: &TypeRc) -> Result<AssembledTypeId> {
        let field = assembled
            .find_field(TYPE_ID_FIELD_NAME)
            .filter(|field| field.is_static() && self.is_assembled_type(assembled))
            .ok_or_else(|| {
                argument_error!(
                    "assembled",
                    "'{}' is not an assembled type",
                    assembled.fullname()
                )
            })?;

        Interpreter::new().ensure_initialized(assembled)?;
        match assembled.static_value(&field) {
            Value::Identifier(id) => Ok((*id).clone()),
            other => Err(invalid_operation!(
                "Field '{}' of '{}' holds {:?} instead of an identifier",
                TYPE_ID_FIELD_NAME,
                assembled.fullname(),
                other
            )),
        }
    }

    fn next_proxy_name(&self, requested: &TypeRc) -> String {
        loop {
            let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
            let name = format!("{}_Proxy_{}", requested.name, counter);
            let fullname = if requested.namespace.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", requested.namespace, name)
            };
            if !self.registry.contains_fullname(&fullname) {
                return name;
            }
        }
    }
}

fn is_visible(ty: &TypeRc) -> bool {
    ty.flags.is_visible() && ty.declaring_type().is_none_or(|outer| is_visible(&outer))
}

fn run_callbacks(
    callbacks: Vec<GenerationCompletedCallback>,
    generated: &GeneratedTypesContext,
) -> Result<()> {
    for callback in callbacks {
        callback(generated)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        codegen::{ModuleNaming, RuntimeCodeGenerator},
        runtime::{ClassBuilder, MethodAttributes, MethodSignature, TypeAttributes},
        test::{
            fixtures::{animal_hierarchy, greeter_base, registry},
            participants::{greeting_participant, NamedParticipant},
        },
    };

    fn assembler(registry: &Arc<TypeRegistry>, participants: Vec<Arc<dyn Participant>>) -> TypeAssembler {
        TypeAssembler::new("test", participants, registry.clone()).unwrap()
    }

    fn code_generator(registry: &Arc<TypeRegistry>) -> RuntimeCodeGenerator {
        RuntimeCodeGenerator::new(registry.clone(), ModuleNaming::new(None, "Assembly.{counter}"))
    }

    #[test]
    fn test_greet_override_is_generated() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let assembler = assembler(
            &registry,
            vec![Arc::new(greeting_participant("greeter", "hello"))],
        );
        let id = assembler.compute_type_id(&base);

        let generated = assembler
            .assemble_type(&id, &mut ParticipantState::new(), &mut code_generator(&registry))
            .unwrap();

        assert_eq!(generated.fullname(), "App.Base_Proxy_1");
        assert!(generated.is_subclass_of(&base));
        assert!(assembler.is_assembled_type(&generated));
        assert_eq!(
            assembler.get_requested_type(&generated).unwrap().token,
            base.token
        );
        let instance = generated.create_instance(&[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("hello"));
        assert_eq!(assembler.extract_type_id(&generated).unwrap(), id);
    }

    #[test]
    fn test_unmodified_proxy_returns_requested_type() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let silent = Arc::new(NamedParticipant::new("silent"));
        let assembler = assembler(&registry, vec![silent.clone()]);
        let before = registry.len();

        let result = assembler
            .assemble_type(
                &assembler.compute_type_id(&base),
                &mut ParticipantState::new(),
                &mut code_generator(&registry),
            )
            .unwrap();

        assert_eq!(result.token, base.token);
        assert_eq!(silent.participations(), 1);
        assert_eq!(registry.len(), before);
        assert!(!assembler.is_assembled_type(&result));
    }

    #[test]
    fn test_non_subclassable_types_are_reported() {
        let registry = Arc::new(registry());
        let sealed = ClassBuilder::new("App", "Final")
            .public()
            .sealed()
            .default_constructor()
            .build(&registry)
            .unwrap();
        let (_, _, speaker) = animal_hierarchy(&registry);
        let hidden = ClassBuilder::new("App", "Hidden")
            .default_constructor()
            .build(&registry)
            .unwrap();
        let participant = Arc::new(NamedParticipant::new("observer"));
        let assembler = assembler(&registry, vec![participant.clone()]);
        let mut code_generator = code_generator(&registry);

        for requested in [&sealed, &speaker, &hidden] {
            let result = assembler
                .assemble_type(
                    &assembler.compute_type_id(requested),
                    &mut ParticipantState::new(),
                    &mut code_generator,
                )
                .unwrap();
            assert_eq!(result.token, requested.token);
        }

        assert_eq!(participant.participations(), 0);
        assert_eq!(
            participant.non_subclassable_types(),
            vec!["App.Final", "App.ISpeaker", "App.Hidden"]
        );
    }

    #[test]
    fn test_participants_run_in_order_with_own_part() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let first = NamedParticipant::new("first")
            .with_part(|_: &TypeRc| Some(IdPart::from("alpha")))
            .on_participate(|state, context| {
                assert_eq!(context.own_part(), Some(&IdPart::from("alpha")));
                state.insert("order", vec!["first".to_string()]);
                Ok(())
            });
        let second = NamedParticipant::new("second").on_participate(|state, context| {
            assert_eq!(context.own_part(), None);
            state
                .get_mut::<Vec<String>>("order")
                .unwrap()
                .push("second".to_string());
            Ok(())
        });
        let assembler = assembler(&registry, vec![Arc::new(first), Arc::new(second)]);
        let mut state = ParticipantState::new();

        assembler
            .assemble_type(
                &assembler.compute_type_id(&base),
                &mut state,
                &mut code_generator(&registry),
            )
            .unwrap();

        assert_eq!(
            state.get::<Vec<String>>("order").unwrap(),
            &vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_additional_types_and_callbacks_share_batch() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let completed = Arc::new(AtomicUsize::new(0));
        let seen = completed.clone();
        let participant = NamedParticipant::new("helper").on_participate(move |_, context| {
            let helper = context.create_additional_type(
                "App.Generated",
                "Helper",
                TypeAttributes::PUBLIC,
                None,
            )?;
            let answer = context.type_mut(helper)?.add_method(
                "Answer",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::constant("helped")),
            )?;
            let greet = context.requested_type().method("Greet")?;
            let proxy = context.proxy_mut()?;
            let (handle, _) = proxy.get_or_add_override(&greet)?;
            proxy.set_method_body(handle, Expr::call_static(answer, vec![]))?;

            let seen = seen.clone();
            context.on_generation_completed(move |generated| {
                assert_eq!(generated.len(), 2);
                generated.get_method(answer)?;
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        let assembler = assembler(&registry, vec![Arc::new(participant)]);

        let generated = assembler
            .assemble_type(
                &assembler.compute_type_id(&base),
                &mut ParticipantState::new(),
                &mut code_generator(&registry),
            )
            .unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert!(registry.contains_fullname("App.Generated.Helper"));
        let instance = generated.create_instance(&[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("helped"));
    }

    #[test]
    fn test_failed_callback_leaves_batch_and_retry_renames() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let participant = NamedParticipant::new("flaky").on_participate(move |_, context| {
            let greet = context.requested_type().method("Greet")?;
            let proxy = context.proxy_mut()?;
            let (handle, _) = proxy.get_or_add_override(&greet)?;
            proxy.set_method_body(handle, Expr::constant("retried"))?;

            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            context.on_generation_completed(move |_| {
                if attempt == 0 {
                    return Err(invalid_operation!("first completion fails"));
                }
                Ok(())
            });
            Ok(())
        });
        let assembler = assembler(&registry, vec![Arc::new(participant)]);
        let id = assembler.compute_type_id(&base);
        let mut code_generator = code_generator(&registry);

        assert!(assembler
            .assemble_type(&id, &mut ParticipantState::new(), &mut code_generator)
            .is_err());
        assert!(registry.contains_fullname("App.Base_Proxy_1"));

        let generated = assembler
            .assemble_type(&id, &mut ParticipantState::new(), &mut code_generator)
            .unwrap();
        assert_eq!(generated.fullname(), "App.Base_Proxy_2");
        assert_eq!(code_generator.generated_types().len(), 2);
        let instance = generated.create_instance(&[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("retried"));
    }

    #[test]
    fn test_participant_errors_carry_context() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let failing = NamedParticipant::new("failing")
            .on_participate(|_, _| Err(not_supported!("cannot mix in")));
        let assembler = assembler(&registry, vec![Arc::new(failing)]);

        let error = assembler
            .assemble_type(
                &assembler.compute_type_id(&base),
                &mut ParticipantState::new(),
                &mut code_generator(&registry),
            )
            .unwrap_err();

        match error {
            Error::NotSupported(message) => {
                assert!(message.contains("App.Base"));
                assert!(message.contains("'failing'"));
                assert!(message.ends_with("cannot mix in"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_proxy_names_skip_registered_names() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        ClassBuilder::new("App", "Base_Proxy_1")
            .public()
            .build(&registry)
            .unwrap();
        let assembler = assembler(
            &registry,
            vec![Arc::new(greeting_participant("greeter", "hi"))],
        );

        let generated = assembler
            .assemble_type(
                &assembler.compute_type_id(&base),
                &mut ParticipantState::new(),
                &mut code_generator(&registry),
            )
            .unwrap();

        assert_eq!(generated.name, "Base_Proxy_2");
    }

    #[test]
    fn test_additional_type_first_answer_wins() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let existing = base.clone();
        let creator = NamedParticipant::new("creator").on_additional_type(|id, context| {
            if id != &IdPart::from("created") {
                return Ok(None);
            }
            let handle = context.create_additional_type(
                "App",
                "Created",
                TypeAttributes::PUBLIC,
                None,
            )?;
            Ok(Some(AdditionalType::Created(handle)))
        });
        let provider = NamedParticipant::new("provider").on_additional_type(move |id, _| {
            Ok((id == &IdPart::from("existing")).then(|| AdditionalType::Existing(existing.clone())))
        });
        let assembler = assembler(&registry, vec![Arc::new(creator), Arc::new(provider)]);
        let mut code_generator = code_generator(&registry);
        let mut state = ParticipantState::new();

        let created = assembler
            .assemble_additional_type(&IdPart::from("created"), &mut state, &mut code_generator)
            .unwrap();
        assert_eq!(created.fullname(), "App.Created");

        let provided = assembler
            .assemble_additional_type(&IdPart::from("existing"), &mut state, &mut code_generator)
            .unwrap();
        assert_eq!(provided.token, base.token);

        assert!(matches!(
            assembler.assemble_additional_type(&IdPart::Int(7), &mut state, &mut code_generator),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_duplicate_participant_names_are_rejected() {
        let registry = Arc::new(registry());
        let result = TypeAssembler::new(
            "test",
            vec![
                Arc::new(NamedParticipant::new("twice")) as Arc<dyn Participant>,
                Arc::new(NamedParticipant::new("twice")),
            ],
            registry,
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
