//! The public facade tying participants, caches and code generation together.
//!
//! A [`Pipeline`] owns one configured set of participants and everything needed to serve
//! requests for them concurrently: the [`TypeAssembler`], the type and constructor caches,
//! the code generation lock and the module context pool. Pipelines are independent of each
//! other; nothing is shared through globals.
//!
//! # Key Components
//!
//! - [`Pipeline`]: Instance creation
//! - [`PipelineBuilder`] / [`PipelineSettings`]: Configuration
//! - [`ReflectionService`]: Types, identifiers and constructor delegates
//! - [`CodeManager`]: Flushing generated modules and loading them back
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typeforge::prelude::*;
//!
//! # fn participant() -> Arc<dyn Participant> { unimplemented!() }
//! let registry = Arc::new(TypeRegistry::new()?);
//! let base = ClassBuilder::new("App", "Base")
//!     .public()
//!     .default_constructor()
//!     .build(&registry)?;
//!
//! let pipeline = Pipeline::builder(registry)
//!     .participant(participant())
//!     .degree_of_parallelism(2)
//!     .build()?;
//! let instance = pipeline.create(&base, &[])?;
//! println!("{}", instance.runtime_type().fullname());
//! # Ok::<(), typeforge::Error>(())
//! ```

mod code_manager;
mod reflection;
mod settings;

use std::{path::PathBuf, sync::Arc};

use tracing::debug;

pub use code_manager::CodeManager;
pub use reflection::ReflectionService;
pub use settings::PipelineSettings;

use crate::{
    assembler::{Participant, TypeAssembler},
    cache::{ConstructorCallCache, TypeCache},
    codegen::{CodeGenerator, ModuleNaming, RuntimeCodeGenerator},
    runtime::{ObjectRef, TypeRc, TypeRegistry, TypeSignature, Value},
    sync::{CodeGenerationLock, ModuleContextPool},
    Result,
};

/// Creates instances of requested types through the types generated for them
pub struct Pipeline {
    settings: PipelineSettings,
    registry: Arc<TypeRegistry>,
    assembler: Arc<TypeAssembler>,
    reflection_service: ReflectionService,
    code_manager: CodeManager,
}

impl Pipeline {
    /// Starts configuring a pipeline generating into `registry`
    pub fn builder(registry: Arc<TypeRegistry>) -> PipelineBuilder {
        PipelineBuilder::new(registry)
    }

    /// Creates a pipeline running `participants` in the given order.
    ///
    /// # Errors
    /// Returns [`crate::Error::Configuration`] for invalid settings or duplicate participant
    /// names.
    pub fn new(
        registry: Arc<TypeRegistry>,
        settings: PipelineSettings,
        participants: Vec<Arc<dyn Participant>>,
    ) -> Result<Self> {
        settings.validate()?;

        let assembler = Arc::new(TypeAssembler::new(
            settings.participant_configuration_id.clone(),
            participants,
            registry.clone(),
        )?);
        let naming = ModuleNaming::new(
            settings.assembly_directory.clone(),
            settings.module_name_pattern.clone(),
        );
        let factory_registry = registry.clone();
        let pool = Arc::new(ModuleContextPool::new(
            settings.degree_of_parallelism,
            move || {
                Box::new(RuntimeCodeGenerator::new(factory_registry.clone(), naming.clone()))
                    as Box<dyn CodeGenerator>
            },
        )?);
        let lock = Arc::new(CodeGenerationLock::new());
        let type_cache = Arc::new(TypeCache::new(assembler.clone(), lock.clone(), pool.clone()));
        let constructors = Arc::new(ConstructorCallCache::new(type_cache.clone()));

        debug!(
            configuration = %settings.participant_configuration_id,
            participants = assembler.participants().len(),
            contexts = settings.degree_of_parallelism,
            "created pipeline"
        );
        Ok(Pipeline {
            reflection_service: ReflectionService::new(
                assembler.clone(),
                type_cache.clone(),
                constructors,
            ),
            code_manager: CodeManager::new(
                assembler.clone(),
                type_cache,
                lock,
                pool,
                registry.clone(),
            ),
            settings,
            registry,
            assembler,
        })
    }

    /// The settings the pipeline was created with
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// The registry holding requested and generated types
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Identifies the participant configuration
    pub fn participant_configuration_id(&self) -> &str {
        self.assembler.participant_configuration_id()
    }

    /// The participants in execution order
    pub fn participants(&self) -> &[Arc<dyn Participant>] {
        self.assembler.participants()
    }

    /// Type-level access: generated types, identifiers and constructor delegates
    pub fn reflection_service(&self) -> &ReflectionService {
        &self.reflection_service
    }

    /// Flushing and loading of generated code
    pub fn code_manager(&self) -> &CodeManager {
        &self.code_manager
    }

    /// Creates an instance of the type generated for `requested`, calling the public
    /// constructor that best matches `arguments`.
    ///
    /// # Errors
    /// Any assembly error, [`crate::Error::MissingMember`] if no public constructor
    /// matches, and any error raised by the constructor.
    pub fn create(&self, requested: &TypeRc, arguments: &[Value]) -> Result<ObjectRef> {
        let id = self.reflection_service.get_type_id_for_requested_type(requested);
        self.reflection_service
            .instantiate_assembled_type(&id, arguments, false)
    }

    /// Creates an instance through the constructor declared with `parameters`.
    ///
    /// # Errors
    /// See [`Pipeline::create`]; non-public constructors are considered if
    /// `allow_non_public` is set.
    pub fn create_with(
        &self,
        requested: &TypeRc,
        parameters: &[TypeSignature],
        arguments: &[Value],
        allow_non_public: bool,
    ) -> Result<ObjectRef> {
        let id = self.reflection_service.get_type_id_for_requested_type(requested);
        let constructor = self
            .reflection_service
            .get_constructor(&id, parameters, allow_non_public)?;
        constructor(arguments)
    }
}

/// Fluent construction of a [`Pipeline`]
pub struct PipelineBuilder {
    registry: Arc<TypeRegistry>,
    settings: PipelineSettings,
    participants: Vec<Arc<dyn Participant>>,
}

impl PipelineBuilder {
    /// Starts with default settings and no participants
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        PipelineBuilder {
            registry,
            settings: PipelineSettings::default(),
            participants: Vec::new(),
        }
    }

    /// Replaces all settings
    #[must_use]
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Appends a participant; participants run in the order they are added
    #[must_use]
    pub fn participant(mut self, participant: Arc<dyn Participant>) -> Self {
        self.participants.push(participant);
        self
    }

    /// Sets the participant configuration id
    #[must_use]
    pub fn participant_configuration_id(mut self, id: impl Into<String>) -> Self {
        self.settings.participant_configuration_id = id.into();
        self
    }

    /// Sets the directory flushed modules are written to
    #[must_use]
    pub fn assembly_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.settings.assembly_directory = Some(directory.into());
        self
    }

    /// Sets the module name pattern
    #[must_use]
    pub fn module_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.settings.module_name_pattern = pattern.into();
        self
    }

    /// Sets the number of module contexts
    #[must_use]
    pub fn degree_of_parallelism(mut self, degree: usize) -> Self {
        self.settings.degree_of_parallelism = degree;
        self
    }

    /// Creates the pipeline
    ///
    /// # Errors
    /// See [`Pipeline::new`].
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.registry, self.settings, self.participants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        runtime::{ClassBuilder, Expr, MethodAttributes, MethodSignature},
        test::{
            fixtures::{animal_hierarchy, greeter_base, registry},
            participants::{greeting_participant, NamedParticipant},
        },
        Error,
    };

    #[test]
    fn test_create_instantiates_generated_type() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let pipeline = Pipeline::builder(registry)
            .participant(Arc::new(greeting_participant("greeter", "hello")))
            .build()
            .unwrap();

        let instance = pipeline.create(&base, &[]).unwrap();
        let generated = instance.runtime_type();

        assert!(pipeline.reflection_service().is_assembled_type(generated));
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn test_added_method_on_plain_base() {
        let registry = Arc::new(registry());
        let base = ClassBuilder::new("App", "Plain")
            .public()
            .default_constructor()
            .build(&registry)
            .unwrap();
        let participant = NamedParticipant::new("greeter").on_participate(|_, context| {
            context.proxy_mut()?.add_method(
                "Greet",
                MethodAttributes::PUBLIC,
                MethodSignature::new(TypeSignature::String, vec![]),
                Some(Expr::constant("hi")),
            )?;
            Ok(())
        });
        let pipeline = Pipeline::builder(registry)
            .participant(Arc::new(participant))
            .build()
            .unwrap();

        let instance = pipeline.create(&base, &[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("hi"));
        assert!(instance.runtime_type().is_subclass_of(&base));

        let again = pipeline.reflection_service().get_assembled_type(&base).unwrap();
        assert!(Arc::ptr_eq(instance.runtime_type(), &again));
    }

    #[test]
    fn test_create_without_participants_uses_requested_type() {
        let registry = Arc::new(registry());
        let (_, dog, _) = animal_hierarchy(&registry);
        let pipeline = Pipeline::builder(registry)
            .participant(Arc::new(NamedParticipant::new("noop")))
            .build()
            .unwrap();

        let instance = pipeline.create(&dog, &[]).unwrap();
        assert_eq!(instance.runtime_type().token, dog.token);
        assert_eq!(instance.call("Speak", &[]).unwrap().as_str(), Some("woof"));
    }

    #[test]
    fn test_create_with_hidden_constructor() {
        let registry = Arc::new(registry());
        let (animal, _, _) = animal_hierarchy(&registry);
        let pipeline = Pipeline::builder(registry).build().unwrap();

        assert!(matches!(
            pipeline.create_with(&animal, &[], &[], true),
            Err(Error::AbstractInstantiation(_))
        ));
    }

    #[test]
    fn test_builder_validates_settings() {
        let registry = Arc::new(registry());
        let result = Pipeline::builder(registry)
            .module_name_pattern("NoCounter")
            .build();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_type_ids_round_trip_through_reflection() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let pipeline = Pipeline::builder(registry)
            .participant(Arc::new(greeting_participant("greeter", "hello")))
            .build()
            .unwrap();
        let reflection = pipeline.reflection_service();

        let generated = reflection.get_assembled_type(&base).unwrap();
        let id = reflection.get_type_id_for_assembled_type(&generated).unwrap();

        assert_eq!(id, reflection.get_type_id_for_requested_type(&base));
        assert_eq!(
            reflection.get_assembled_type_by_id(&id).unwrap().token,
            generated.token
        );
        assert_eq!(
            reflection.get_requested_type(&generated).unwrap().token,
            base.token
        );
    }
}
