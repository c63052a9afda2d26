//! Bounded, thread-affine pool of module contexts.

use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    thread::{self, ThreadId},
};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};
use uguid::Guid;

use crate::{
    codegen::{CodeGenerator, TypeBuilder},
    runtime::{TypeAttributes, TypeRc},
    Error, Result,
};

/// Creates the backend of a new module context
pub type CodeGeneratorFactory = Box<dyn Fn() -> Box<dyn CodeGenerator> + Send + Sync>;

/// One module-construction scope.
///
/// The backend is locked for the duration of each call only, so a thread holding the
/// context may start a nested batch on it between two calls.
pub struct ModuleContext {
    id: usize,
    generator: Mutex<Box<dyn CodeGenerator>>,
}

impl ModuleContext {
    fn new(id: usize, generator: Box<dyn CodeGenerator>) -> Self {
        ModuleContext {
            id,
            generator: Mutex::new(generator),
        }
    }

    /// Position of this context in creation order
    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs `f` with exclusive access to the backend
    pub fn with_generator<R>(&self, f: impl FnOnce(&mut dyn CodeGenerator) -> R) -> R {
        let mut generator = self.generator.lock();
        f(generator.as_mut())
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("module", &self.with_generator(|generator| generator.module_name()))
            .finish()
    }
}

/// A context taken from a [`ModuleContextPool`] by one thread.
///
/// Leases implement [`CodeGenerator`] and must be returned through
/// [`ModuleContextPool::enqueue`] on the thread that took them.
#[derive(Debug)]
pub struct ModuleContextLease {
    context: Arc<ModuleContext>,
    owner: ThreadId,
}

impl ModuleContextLease {
    /// The leased context
    pub fn context(&self) -> &Arc<ModuleContext> {
        &self.context
    }

    /// The thread that took the lease
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl CodeGenerator for ModuleContextLease {
    fn module_id(&self) -> Guid {
        self.context.with_generator(|generator| generator.module_id())
    }

    fn module_name(&self) -> String {
        self.context.with_generator(|generator| generator.module_name())
    }

    fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        declaring: Option<&TypeRc>,
    ) -> Result<Box<dyn TypeBuilder>> {
        self.context
            .with_generator(|generator| generator.define_type(namespace, name, flags, declaring))
    }

    fn flush(&mut self, participant_configuration_id: &str) -> Result<Option<PathBuf>> {
        self.context
            .with_generator(|generator| generator.flush(participant_configuration_id))
    }

    fn generated_types(&self) -> Vec<TypeRc> {
        self.context.with_generator(|generator| generator.generated_types())
    }
}

struct PoolState {
    available: Vec<Arc<ModuleContext>>,
    created: usize,
}

/// Bounded pool of module contexts with per-thread leases.
///
/// Contexts are created lazily up to the capacity; [`ModuleContextPool::dequeue`] blocks
/// while all of them are leased. A thread that dequeues again before returning its lease
/// receives the same context, and must enqueue once per dequeue.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use typeforge::codegen::{CodeGenerator, ModuleNaming, RuntimeCodeGenerator};
/// use typeforge::runtime::TypeRegistry;
/// use typeforge::sync::ModuleContextPool;
///
/// let registry = Arc::new(TypeRegistry::new()?);
/// let naming = ModuleNaming::new(None, "Doc.{counter}");
/// let pool = ModuleContextPool::new(2, move || {
///     Box::new(RuntimeCodeGenerator::new(registry.clone(), naming.clone())) as Box<dyn CodeGenerator>
/// })?;
///
/// let outer = pool.dequeue()?;
/// let inner = pool.dequeue()?;
/// assert_eq!(outer.context().id(), inner.context().id());
/// pool.enqueue(inner)?;
/// pool.enqueue(outer)?;
/// # Ok::<(), typeforge::Error>(())
/// ```
pub struct ModuleContextPool {
    capacity: usize,
    factory: CodeGeneratorFactory,
    state: Mutex<PoolState>,
    returned: Condvar,
    leases: DashMap<ThreadId, (Arc<ModuleContext>, usize)>,
}

impl ModuleContextPool {
    /// Creates an empty pool holding at most `capacity` contexts.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for a capacity of zero.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self>
    where
        F: Fn() -> Box<dyn CodeGenerator> + Send + Sync + 'static,
    {
        if capacity == 0 {
            return Err(Error::Configuration(
                "Module context pool capacity must be greater than 0".to_string(),
            ));
        }
        Ok(ModuleContextPool {
            capacity,
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                available: Vec::with_capacity(capacity),
                created: 0,
            }),
            returned: Condvar::new(),
            leases: DashMap::new(),
        })
    }

    /// Maximum number of contexts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of contexts created so far
    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    /// Number of contexts not leased by any thread
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        state.available.len() + (self.capacity - state.created)
    }

    /// Takes a context for the calling thread, blocking while all contexts are leased by
    /// other threads.
    ///
    /// # Errors
    /// Currently infallible; kept fallible for backends that fail to open a module.
    pub fn dequeue(&self) -> Result<ModuleContextLease> {
        let owner = thread::current().id();
        if let Some(mut lease) = self.leases.get_mut(&owner) {
            lease.1 += 1;
            return Ok(ModuleContextLease {
                context: lease.0.clone(),
                owner,
            });
        }

        let context = {
            let mut state = self.state.lock();
            loop {
                if let Some(context) = state.available.pop() {
                    break context;
                }
                if state.created < self.capacity {
                    let context = Arc::new(ModuleContext::new(state.created, (self.factory)()));
                    state.created += 1;
                    debug!(context = context.id(), "created module context");
                    break context;
                }
                self.returned.wait(&mut state);
            }
        };

        debug!(context = context.id(), thread = ?owner, "leased module context");
        self.leases.insert(owner, (context.clone(), 1));
        Ok(ModuleContextLease { context, owner })
    }

    /// Returns a lease taken by the calling thread.
    ///
    /// A lease returned on a foreign thread is still released on behalf of its owner, so
    /// the pool keeps serving other threads after the error.
    ///
    /// # Errors
    /// Returns [`Error::PoolAffinity`] if the lease was taken on another thread and
    /// [`Error::InvalidOperation`] if the calling thread holds no lease on this pool.
    pub fn enqueue(&self, lease: ModuleContextLease) -> Result<()> {
        let current = thread::current().id();
        if lease.owner != current {
            warn!(
                owner = ?lease.owner,
                current = ?current,
                "module context returned on a foreign thread"
            );
            let owner = lease.owner;
            self.release(lease)?;
            return Err(Error::PoolAffinity {
                owner: format!("{owner:?}"),
                current: format!("{current:?}"),
            });
        }
        self.release(lease)
    }

    fn release(&self, lease: ModuleContextLease) -> Result<()> {
        let owner = lease.owner;
        let released = {
            let mut entry = self.leases.get_mut(&owner).ok_or_else(|| {
                invalid_operation!("Thread {:?} holds no module context lease", owner)
            })?;
            if !Arc::ptr_eq(&entry.0, &lease.context) {
                return Err(invalid_operation!(
                    "Module context {} is not leased by thread {:?}",
                    lease.context.id(),
                    owner
                ));
            }
            entry.1 -= 1;
            entry.1 == 0
        };
        if released {
            self.leases.remove(&owner);
            self.state.lock().available.push(lease.context);
            self.returned.notify_one();
        }
        Ok(())
    }

    /// Takes every created context, waiting until other threads have returned theirs.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if the calling thread holds a lease itself.
    pub fn dequeue_all(&self) -> Result<Vec<Arc<ModuleContext>>> {
        let current = thread::current().id();
        if self.leases.contains_key(&current) {
            return Err(invalid_operation!(
                "Thread {:?} cannot take all module contexts while holding one",
                current
            ));
        }

        let mut state = self.state.lock();
        while state.available.len() < state.created {
            self.returned.wait(&mut state);
        }
        let mut contexts = std::mem::take(&mut state.available);
        contexts.sort_by_key(|context| context.id());
        Ok(contexts)
    }

    /// Returns contexts taken through [`ModuleContextPool::dequeue_all`]
    pub fn enqueue_all(&self, contexts: Vec<Arc<ModuleContext>>) {
        self.state.lock().available.extend(contexts);
        self.returned.notify_all();
    }
}
