//! Identifier-keyed cache of generated types.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::{
    assembler::{ParticipantState, TypeAssembler},
    codegen::CodeGenerator,
    identity::{AssembledTypeId, IdPart},
    runtime::TypeRc,
    sync::{CodeGenerationLock, ModuleContextPool},
    Result,
};

/// Maps request identifiers to generated types, generating on a miss.
///
/// Hits never block. Misses enter the [`CodeGenerationLock`], look the identifier up again
/// and only then generate, so concurrent requests for one identifier produce exactly one
/// type. The entry is written before the section is left.
pub struct TypeCache {
    assembler: Arc<TypeAssembler>,
    lock: Arc<CodeGenerationLock>,
    pool: Arc<ModuleContextPool>,
    types: DashMap<AssembledTypeId, TypeRc>,
    additional_types: DashMap<IdPart, TypeRc>,
}

impl TypeCache {
    /// Creates an empty cache generating through `assembler` on contexts of `pool`
    pub fn new(
        assembler: Arc<TypeAssembler>,
        lock: Arc<CodeGenerationLock>,
        pool: Arc<ModuleContextPool>,
    ) -> Self {
        TypeCache {
            assembler,
            lock,
            pool,
            types: DashMap::new(),
            additional_types: DashMap::new(),
        }
    }

    /// The assembler used on misses
    pub fn assembler(&self) -> &Arc<TypeAssembler> {
        &self.assembler
    }

    /// The critical section guarding generation
    pub fn code_generation_lock(&self) -> &Arc<CodeGenerationLock> {
        &self.lock
    }

    /// The module contexts generation runs on
    pub fn pool(&self) -> &Arc<ModuleContextPool> {
        &self.pool
    }

    /// The type generated for `requested` with the current participant configuration
    ///
    /// # Errors
    /// See [`TypeCache::get_or_create_type_by_id`].
    pub fn get_or_create_type(&self, requested: &TypeRc) -> Result<TypeRc> {
        self.get_or_create_type_by_id(&self.assembler.compute_type_id(requested))
    }

    /// The type generated for `id`, generating it on the first request.
    ///
    /// # Errors
    /// Any assembly error; nothing is cached for a failed request.
    pub fn get_or_create_type_by_id(&self, id: &AssembledTypeId) -> Result<TypeRc> {
        if let Some(ty) = self.get(id) {
            return Ok(ty);
        }

        let _guard = self.lock.enter();
        if let Some(ty) = self.get(id) {
            return Ok(ty);
        }

        debug!(id = %id, "type cache miss");
        let ty = self.with_code_generator(|assembler, code_generator| {
            assembler.assemble_type(id, &mut ParticipantState::new(), code_generator)
        })?;
        self.types.insert(id.clone(), ty.clone());
        Ok(ty)
    }

    /// The additional type for `additional_id`, generating it on the first request.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if no participant knows the identifier, and
    /// any assembly error.
    pub fn get_or_create_additional_type(&self, additional_id: &IdPart) -> Result<TypeRc> {
        if let Some(ty) = self.get_additional(additional_id) {
            return Ok(ty);
        }

        let _guard = self.lock.enter();
        if let Some(ty) = self.get_additional(additional_id) {
            return Ok(ty);
        }

        debug!(id = %additional_id, "additional type cache miss");
        let ty = self.with_code_generator(|assembler, code_generator| {
            assembler.assemble_additional_type(
                additional_id,
                &mut ParticipantState::new(),
                code_generator,
            )
        })?;
        self.additional_types.insert(additional_id.clone(), ty.clone());
        Ok(ty)
    }

    fn with_code_generator<F>(&self, generate: F) -> Result<TypeRc>
    where
        F: FnOnce(&TypeAssembler, &mut dyn CodeGenerator) -> Result<TypeRc>,
    {
        let mut lease = self.pool.dequeue()?;
        let result = generate(&self.assembler, &mut lease);
        self.pool.enqueue(lease)?;
        result
    }

    /// The cached type for `id`, without generating
    pub fn get(&self, id: &AssembledTypeId) -> Option<TypeRc> {
        self.types.get(id).map(|entry| entry.value().clone())
    }

    /// The cached additional type for `additional_id`, without generating
    pub fn get_additional(&self, additional_id: &IdPart) -> Option<TypeRc> {
        self.additional_types
            .get(additional_id)
            .map(|entry| entry.value().clone())
    }

    /// Adds types re-created from flushed modules. Identifiers that are already cached keep
    /// their type; returns the number of added entries.
    pub fn load_types(&self, types: impl IntoIterator<Item = (AssembledTypeId, TypeRc)>) -> usize {
        let _guard = self.lock.enter();
        let mut added = 0;
        for (id, ty) in types {
            if let dashmap::mapref::entry::Entry::Vacant(entry) = self.types.entry(id) {
                entry.insert(ty);
                added += 1;
            }
        }
        added
    }

    /// Adds loaded additional types under their identifiers; returns the number added
    pub fn load_additional_types(&self, types: impl IntoIterator<Item = (IdPart, TypeRc)>) -> usize {
        let _guard = self.lock.enter();
        let mut added = 0;
        for (id, ty) in types {
            if let dashmap::mapref::entry::Entry::Vacant(entry) = self.additional_types.entry(id) {
                entry.insert(ty);
                added += 1;
            }
        }
        added
    }

    /// Every cached identifier with its type
    pub fn entries(&self) -> Vec<(AssembledTypeId, TypeRc)> {
        self.types
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of cached proxy types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no proxy type is cached
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{OnceLock, Weak},
        thread,
    };

    use super::*;
    use crate::{
        assembler::{AdditionalType, Participant},
        codegen::{ModuleNaming, RuntimeCodeGenerator},
        runtime::{
            Expr, MethodAttributes, MethodSignature, TypeAttributes, TypeRegistry, TypeSignature,
        },
        test::{
            fixtures::{greeter_base, registry},
            participants::{greeting_participant, NamedParticipant},
        },
        Error,
    };

    fn cache(
        registry: &Arc<TypeRegistry>,
        participants: Vec<Arc<dyn Participant>>,
    ) -> TypeCache {
        let assembler =
            Arc::new(TypeAssembler::new("test", participants, registry.clone()).unwrap());
        let factory_registry = registry.clone();
        let naming = ModuleNaming::new(None, "Cache.{counter}");
        let pool = ModuleContextPool::new(2, move || {
            Box::new(RuntimeCodeGenerator::new(
                factory_registry.clone(),
                naming.clone(),
            )) as Box<dyn CodeGenerator>
        })
        .unwrap();
        TypeCache::new(assembler, Arc::new(CodeGenerationLock::new()), Arc::new(pool))
    }

    #[test]
    fn test_equal_requests_share_one_type() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let greeter = Arc::new(greeting_participant("greeter", "hello"));
        let cache = cache(&registry, vec![greeter.clone()]);

        let first = cache.get_or_create_type(&base).unwrap();
        let second = cache.get_or_create_type(&base).unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(greeter.participations(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_requests_generate_once() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let greeter = Arc::new(greeting_participant("greeter", "hello"));
        let cache = Arc::new(cache(&registry, vec![greeter.clone()]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let base = base.clone();
                thread::spawn(move || cache.get_or_create_type(&base).unwrap().token)
            })
            .collect();
        let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(tokens.iter().all(|token| *token == tokens[0]));
        assert_eq!(greeter.participations(), 1);
    }

    #[test]
    fn test_failed_requests_are_not_cached() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let failing = Arc::new(
            NamedParticipant::new("failing").on_participate(|_, _| Err(not_supported!("no"))),
        );
        let cache = cache(&registry, vec![failing.clone()]);

        assert!(matches!(
            cache.get_or_create_type(&base),
            Err(Error::NotSupported(_))
        ));
        assert!(cache.get_or_create_type(&base).is_err());
        assert_eq!(failing.participations(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_additional_types_are_cached() {
        let registry = Arc::new(registry());
        let creator = Arc::new(NamedParticipant::new("creator").on_additional_type(
            |id, context| {
                let name = format!("Extra{}", id);
                let handle =
                    context.create_additional_type("App", &name, TypeAttributes::PUBLIC, None)?;
                Ok(Some(AdditionalType::Created(handle)))
            },
        ));
        let cache = cache(&registry, vec![creator]);

        let first = cache.get_or_create_additional_type(&IdPart::Int(1)).unwrap();
        let again = cache.get_or_create_additional_type(&IdPart::Int(1)).unwrap();
        let other = cache.get_or_create_additional_type(&IdPart::Int(2)).unwrap();

        assert_eq!(first.token, again.token);
        assert_ne!(first.token, other.token);
        assert_eq!(first.fullname(), "App.Extra1");
    }

    #[test]
    fn test_nested_request_from_participant() {
        let registry = Arc::new(registry());
        let base = greeter_base(&registry);
        let slot: Arc<OnceLock<Weak<TypeCache>>> = Arc::new(OnceLock::new());
        let inner = slot.clone();
        let nested = NamedParticipant::new("nested")
            .on_additional_type(|_, context| {
                let handle = context.create_additional_type(
                    "App",
                    "NestedHelper",
                    TypeAttributes::PUBLIC,
                    None,
                )?;
                context.type_mut(handle)?.add_method(
                    "Name",
                    MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                    MethodSignature::new(TypeSignature::String, vec![]),
                    Some(Expr::constant("helper")),
                )?;
                Ok(Some(AdditionalType::Created(handle)))
            })
            .on_participate(move |_, context| {
                let cache = inner
                    .get()
                    .and_then(Weak::upgrade)
                    .ok_or_else(|| invalid_operation!("cache has been dropped"))?;
                let helper = cache.get_or_create_additional_type(&IdPart::from("helper"))?;
                let name = helper.method("Name")?;
                let greet = context.requested_type().method("Greet")?;
                let proxy = context.proxy_mut()?;
                let (handle, _) = proxy.get_or_add_override(&greet)?;
                proxy.set_method_body(handle, Expr::call_static(&name, vec![]))
            });
        let cache = Arc::new(cache(&registry, vec![Arc::new(nested)]));
        slot.set(Arc::downgrade(&cache)).unwrap();

        let generated = cache.get_or_create_type(&base).unwrap();

        let instance = generated.create_instance(&[]).unwrap();
        assert_eq!(instance.call("Greet", &[]).unwrap().as_str(), Some("helper"));
        assert!(cache.get_additional(&IdPart::from("helper")).is_some());
        assert_eq!(cache.pool().created(), 1);
    }
}
