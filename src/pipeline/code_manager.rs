//! Flushing generated code to disk and loading it back.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::{
    assembler::{LoadedProxyType, LoadedTypesContext, TypeAssembler},
    cache::TypeCache,
    codegen::persist,
    runtime::TypeRegistry,
    sync::{CodeGenerationLock, ModuleContextPool},
    Error, Result,
};

/// Writes the modules of a pipeline to disk and re-creates flushed modules
pub struct CodeManager {
    assembler: Arc<TypeAssembler>,
    type_cache: Arc<TypeCache>,
    lock: Arc<CodeGenerationLock>,
    pool: Arc<ModuleContextPool>,
    registry: Arc<TypeRegistry>,
}

impl CodeManager {
    pub(crate) fn new(
        assembler: Arc<TypeAssembler>,
        type_cache: Arc<TypeCache>,
        lock: Arc<CodeGenerationLock>,
        pool: Arc<ModuleContextPool>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        CodeManager {
            assembler,
            type_cache,
            lock,
            pool,
            registry,
        }
    }

    /// Writes every module holding generated types and starts new, empty modules.
    ///
    /// Returns the paths of the written documents; modules without types are skipped.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if the calling thread is generating a type, and
    /// any I/O or persistence error.
    pub fn flush_code_to_disk(&self) -> Result<Vec<PathBuf>> {
        let _guard = self.lock.enter();
        let contexts = self.pool.dequeue_all()?;

        let configuration_id = self.assembler.participant_configuration_id();
        let mut written = Vec::new();
        let mut result = Ok(());
        for context in &contexts {
            match context.with_generator(|generator| generator.flush(configuration_id)) {
                Ok(Some(path)) => written.push(path),
                Ok(None) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        self.pool.enqueue_all(contexts);
        result?;

        debug!(modules = written.len(), "flushed generated code");
        Ok(written)
    }

    /// Re-creates the types of flushed modules, caches the proxies under their stamped
    /// identifiers and lets every participant rebuild its state. Additional types are
    /// cached under the identifiers participants map them to.
    ///
    /// Returns the number of loaded types.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for modules generated with another participant
    /// configuration, and any persistence error.
    pub fn load_flushed_code<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        let _guard = self.lock.enter();
        let configuration_id = self.assembler.participant_configuration_id();

        for path in paths {
            let header = persist::read_module_header(path.as_ref())?;
            if header.participant_configuration_id != configuration_id {
                return Err(Error::Configuration(format!(
                    "Module '{}' was generated with participant configuration '{}', this pipeline uses '{}'",
                    header.name, header.participant_configuration_id, configuration_id
                )));
            }
        }

        let mut loaded = LoadedTypesContext::default();
        for path in paths {
            let module = persist::read_module(path.as_ref(), &self.registry)?;
            debug!(
                module = %module.header.name,
                types = module.types.len(),
                "loaded flushed module"
            );
            for ty in module.types {
                if self.assembler.is_assembled_type(&ty) {
                    loaded.proxy_types.push(LoadedProxyType {
                        requested: self.assembler.get_requested_type(&ty)?,
                        id: self.assembler.extract_type_id(&ty)?,
                        generated: ty,
                    });
                } else {
                    loaded.additional_types.push(ty);
                }
            }
        }

        let count = loaded.proxy_types.len() + loaded.additional_types.len();
        self.type_cache.load_types(
            loaded
                .proxy_types
                .iter()
                .map(|proxy| (proxy.id.clone(), proxy.generated.clone())),
        );
        self.assembler.rebuild_participant_state(&loaded)?;
        let mapped = self.type_cache.load_additional_types(
            loaded.additional_types.iter().filter_map(|ty| {
                self.assembler
                    .get_additional_type_id(ty)
                    .map(|id| (id, ty.clone()))
            }),
        );
        debug!(additional = mapped, "cached loaded additional types");
        Ok(count)
    }
}
