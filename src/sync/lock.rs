//! The critical section guarding code generation.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Re-entrant lock serializing every code generation of a pipeline.
///
/// Cache misses, flushes and loads run inside this section. A thread already inside may
/// enter again, which happens when a participant requests another type while its own
/// request is being assembled.
///
/// # Examples
///
/// ```rust
/// use typeforge::sync::CodeGenerationLock;
///
/// let lock = CodeGenerationLock::new();
/// let outer = lock.enter();
/// let inner = lock.enter();
/// assert!(lock.is_held_by_current_thread());
/// drop(inner);
/// drop(outer);
/// assert!(!lock.is_held_by_current_thread());
/// ```
#[derive(Default)]
pub struct CodeGenerationLock {
    inner: ReentrantMutex<()>,
}

/// Proof of being inside the code generation section
pub type CodeGenerationGuard<'a> = ReentrantMutexGuard<'a, ()>;

impl CodeGenerationLock {
    /// Creates an unlocked section
    #[must_use]
    pub fn new() -> Self {
        CodeGenerationLock {
            inner: ReentrantMutex::new(()),
        }
    }

    /// Enters the section, blocking while another thread is inside
    pub fn enter(&self) -> CodeGenerationGuard<'_> {
        self.inner.lock()
    }

    /// Enters the section if no other thread is inside
    pub fn try_enter(&self) -> Option<CodeGenerationGuard<'_>> {
        self.inner.try_lock()
    }

    /// Returns true if the calling thread is inside the section
    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }
}
