//! Cached constructor delegates for generated types.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    cache::TypeCache,
    identity::AssembledTypeId,
    runtime::{
        interpreter::Interpreter, MemberAccess, MethodRc, ObjectRef, TypeRc, TypeSignature, Value,
    },
    Error, Result,
};

/// Creates an instance of a generated type through one of its constructors
pub type ConstructorDelegate = Arc<dyn Fn(&[Value]) -> Result<ObjectRef> + Send + Sync>;

#[derive(Clone, PartialEq, Eq, Hash)]
struct ConstructorKey {
    id: AssembledTypeId,
    parameters: Vec<TypeSignature>,
    allow_non_public: bool,
}

/// Caches one [`ConstructorDelegate`] per identifier, parameter list and visibility
pub struct ConstructorCallCache {
    type_cache: Arc<TypeCache>,
    delegates: DashMap<ConstructorKey, ConstructorDelegate>,
}

impl ConstructorCallCache {
    /// Creates an empty cache resolving types through `type_cache`
    pub fn new(type_cache: Arc<TypeCache>) -> Self {
        ConstructorCallCache {
            type_cache,
            delegates: DashMap::new(),
        }
    }

    /// The delegate calling the constructor of the type generated for `id` that best
    /// matches `parameters`.
    ///
    /// A constructor matches if it has as many parameters and each declared parameter type
    /// accepts the supplied one; among matches the one with the most identical parameter
    /// types wins. Non-public constructors are considered only if `allow_non_public` is set.
    ///
    /// # Errors
    /// Returns [`Error::AbstractInstantiation`] for abstract types, [`Error::MissingMember`]
    /// if nothing matches, [`Error::Argument`] for ambiguous matches, and any assembly error.
    pub fn get_or_create(
        &self,
        id: &AssembledTypeId,
        parameters: &[TypeSignature],
        allow_non_public: bool,
    ) -> Result<ConstructorDelegate> {
        let key = ConstructorKey {
            id: id.clone(),
            parameters: parameters.to_vec(),
            allow_non_public,
        };
        if let Some(delegate) = self.delegates.get(&key) {
            return Ok(delegate.value().clone());
        }

        let _guard = self.type_cache.code_generation_lock().enter();
        if let Some(delegate) = self.delegates.get(&key) {
            return Ok(delegate.value().clone());
        }

        let ty = self.type_cache.get_or_create_type_by_id(id)?;
        let constructor = select_constructor(&ty, parameters, allow_non_public)?;
        debug!(
            ty = %ty.fullname(),
            constructor = %constructor.full_name(),
            "created constructor delegate"
        );
        let delegate: ConstructorDelegate = Arc::new(move |arguments: &[Value]| {
            Interpreter::new().instantiate(&constructor, arguments)
        });
        self.delegates.insert(key, delegate.clone());
        Ok(delegate)
    }

    /// Number of cached delegates
    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    /// Returns true if no delegate is cached
    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl fmt::Debug for ConstructorCallCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorCallCache")
            .field("delegates", &self.delegates.len())
            .finish()
    }
}

fn parameter_score(declared: &TypeSignature, supplied: &TypeSignature) -> Option<usize> {
    if declared == supplied {
        return Some(2);
    }
    match (declared, supplied) {
        (TypeSignature::Object, supplied) if !supplied.is_void() => Some(1),
        (TypeSignature::Class(_), TypeSignature::Class(_)) => {
            let declared = declared.runtime_type()?;
            let supplied = supplied.runtime_type()?;
            supplied.is_assignable_to(&declared).then_some(1)
        }
        _ => None,
    }
}

pub(crate) fn select_constructor(
    ty: &TypeRc,
    parameters: &[TypeSignature],
    allow_non_public: bool,
) -> Result<MethodRc> {
    if ty.is_abstract() {
        return Err(Error::AbstractInstantiation(ty.fullname()));
    }

    let mut best: Option<(usize, MethodRc)> = None;
    let mut ambiguous = false;
    for constructor in ty.constructor_list() {
        if !allow_non_public && constructor.access() != MemberAccess::Public {
            continue;
        }
        if constructor.signature.arity() != parameters.len() {
            continue;
        }
        let score = constructor
            .signature
            .parameters
            .iter()
            .zip(parameters)
            .map(|(declared, supplied)| parameter_score(&declared.ty, supplied))
            .sum::<Option<usize>>();
        let Some(score) = score else {
            continue;
        };
        match &best {
            Some((best_score, _)) if score < *best_score => {}
            Some((best_score, _)) if score == *best_score => ambiguous = true,
            _ => {
                best = Some((score, constructor));
                ambiguous = false;
            }
        }
    }

    let parameter_list = parameters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    match best {
        Some(_) if ambiguous => Err(argument_error!(
            "parameters",
            "Constructor call '{}({})' is ambiguous",
            ty.fullname(),
            parameter_list
        )),
        Some((_, constructor)) => Ok(constructor),
        None => Err(Error::MissingMember {
            type_name: ty.fullname(),
            member: format!(".ctor({parameter_list})"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembler::{Participant, TypeAssembler},
        codegen::{CodeGenerator, ModuleNaming, RuntimeCodeGenerator},
        runtime::{ClassBuilder, TypeRegistry},
        sync::{CodeGenerationLock, ModuleContextPool},
        test::{
            fixtures::{animal_hierarchy, greeter_base, registry},
            participants::greeting_participant,
        },
    };

    fn constructor_cache(registry: &Arc<TypeRegistry>) -> ConstructorCallCache {
        let participants: Vec<Arc<dyn Participant>> =
            vec![Arc::new(greeting_participant("greeter", "hello"))];
        let assembler = Arc::new(TypeAssembler::new("test", participants, registry.clone()).unwrap());
        let factory_registry = registry.clone();
        let naming = ModuleNaming::new(None, "Ctor.{counter}");
        let pool = ModuleContextPool::new(1, move || {
            Box::new(RuntimeCodeGenerator::new(factory_registry.clone(), naming.clone()))
                as Box<dyn CodeGenerator>
        })
        .unwrap();
        let types = TypeCache::new(assembler, Arc::new(CodeGenerationLock::new()), Arc::new(pool));
        ConstructorCallCache::new(Arc::new(types))
    }

    fn overloaded(registry: &TypeRegistry) -> TypeRc {
        ClassBuilder::new("App", "Overloaded")
            .public()
            .constructor(|c| c.parameter("value", TypeSignature::Object))
            .constructor(|c| c.parameter("value", TypeSignature::String))
            .constructor(|c| c.private().parameter("value", TypeSignature::I4))
            .build(registry)
            .unwrap()
    }

    #[test]
    fn test_delegates_are_cached_per_signature() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let cache = constructor_cache(&registry);
        let id = cache.type_cache.assembler().compute_type_id(&base);

        let first = cache.get_or_create(&id, &[], false).unwrap();
        let second = cache.get_or_create(&id, &[], false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        cache.get_or_create(&id, &[], true).unwrap();
        assert_eq!(cache.len(), 2);

        let instance = first(&[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("hello"));
        assert!(instance.runtime_type().is_subclass_of(&base));
    }

    #[test]
    fn test_best_match_prefers_exact_parameter_types() {
        let registry = registry();
        let ty = overloaded(&registry);

        let exact = select_constructor(&ty, &[TypeSignature::String], false).unwrap();
        assert_eq!(exact.signature.parameters[0].ty, TypeSignature::String);

        let widened = select_constructor(&ty, &[TypeSignature::Boolean], false).unwrap();
        assert_eq!(widened.signature.parameters[0].ty, TypeSignature::Object);

        let hidden = select_constructor(&ty, &[TypeSignature::I4], false).unwrap();
        assert_eq!(hidden.signature.parameters[0].ty, TypeSignature::Object);
        let private = select_constructor(&ty, &[TypeSignature::I4], true).unwrap();
        assert_eq!(private.signature.parameters[0].ty, TypeSignature::I4);
    }

    #[test]
    fn test_missing_and_abstract_constructors() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);

        assert!(matches!(
            select_constructor(&dog, &[TypeSignature::I8], false),
            Err(Error::MissingMember { .. })
        ));
        assert!(matches!(
            select_constructor(&animal, &[], true),
            Err(Error::AbstractInstantiation(_))
        ));
    }
}
