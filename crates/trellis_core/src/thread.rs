//! # Thread-Kind Registry
//!
//! Threads self-identify by kind so code paths can assert who runs them
//! ("only the EVENT thread mutates the graph"). `MainUi`, `Event` and
//! `Render` are singleton kinds: at most one live thread of each.
//!
//! [`ThreadKindRegistry::global`] is the process-wide registry; the toolkit
//! uses it unless handed another one. Tests build their own with
//! [`ThreadKindRegistry::new`] and never collide.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crate::error::{CoreError, CoreResult};
use crate::sync::Mutex;

/// The role a thread plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ThreadKind {
    /// The main UI thread (singleton).
    MainUi,
    /// The scheduler's event thread, owner of the property graph (singleton).
    Event,
    /// The render thread (singleton).
    Render,
    /// General purpose worker.
    Worker,
    /// Timer dispatcher or timer fiber backing thread.
    Timer,
    /// A thread that never registered.
    Anonymous,
}

impl ThreadKind {
    /// Returns true for kinds limited to one live thread.
    #[inline]
    #[must_use]
    pub const fn is_singleton(self) -> bool {
        matches!(self, Self::MainUi | Self::Event | Self::Render)
    }

    /// Short lowercase name, used in thread names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MainUi => "ui",
            Self::Event => "event",
            Self::Render => "render",
            Self::Worker => "worker",
            Self::Timer => "timer",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    kind: ThreadKind,
    token: u64,
}

static GLOBAL: OnceLock<Arc<ThreadKindRegistry>> = OnceLock::new();

/// Mapping from thread to [`ThreadKind`].
#[derive(Debug, Default)]
pub struct ThreadKindRegistry {
    kinds: Mutex<HashMap<ThreadId, Entry>>,
    next_token: AtomicU64,
}

impl ThreadKindRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(Self::new))
    }

    /// Registers the calling thread as `kind`.
    ///
    /// The returned guard unregisters the thread when dropped, which covers
    /// normal exit and unwinding alike. Registering again from the same thread
    /// replaces its kind.
    ///
    /// # Errors
    ///
    /// `DuplicateSingleton` if `kind` is a singleton kind held by another
    /// live thread.
    pub fn register(self: &Arc<Self>, kind: ThreadKind) -> CoreResult<ThreadRegistration> {
        let me = thread::current().id();
        let mut kinds = self.kinds.lock();

        if kind.is_singleton() {
            if let Some((&holder, _)) = kinds.iter().find(|&(&t, e)| e.kind == kind && t != me) {
                return Err(CoreError::DuplicateSingleton { kind, holder });
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if kind == ThreadKind::Anonymous {
            kinds.remove(&me);
        } else {
            kinds.insert(me, Entry { kind, token });
        }
        drop(kinds);

        tracing::debug!(kind = %kind, thread = ?me, "thread registered");
        Ok(ThreadRegistration {
            registry: Arc::clone(self),
            thread: me,
            kind,
            token,
        })
    }

    /// Removes the calling thread's registration. Idempotent.
    pub fn unregister(&self) {
        self.unregister_thread(thread::current().id());
    }

    fn unregister_thread(&self, thread: ThreadId) {
        if let Some(entry) = self.kinds.lock().remove(&thread) {
            tracing::debug!(kind = %entry.kind, thread = ?thread, "thread unregistered");
        }
    }

    /// Returns the calling thread's kind, or `Anonymous`.
    #[must_use]
    pub fn get_kind(&self) -> ThreadKind {
        self.kind_of(thread::current().id())
    }

    /// Returns the kind registered for `thread`, or `Anonymous`.
    #[must_use]
    pub fn kind_of(&self, thread: ThreadId) -> ThreadKind {
        self.kinds
            .lock()
            .get(&thread)
            .map_or(ThreadKind::Anonymous, |entry| entry.kind)
    }

    /// Returns true if the calling thread is registered as `kind`.
    #[must_use]
    pub fn is_current(&self, kind: ThreadKind) -> bool {
        self.get_kind() == kind
    }

    /// Returns the live thread holding `kind`, if any (first match for
    /// non-singleton kinds).
    #[must_use]
    pub fn holder(&self, kind: ThreadKind) -> Option<ThreadId> {
        self.kinds
            .lock()
            .iter()
            .find(|&(_, entry)| entry.kind == kind)
            .map(|(&t, _)| t)
    }

    /// Number of registered threads.
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.kinds.lock().len()
    }
}

/// Scoped registration. Dropping it unregisters the thread it was made on.
#[must_use = "dropping the registration unregisters the thread immediately"]
pub struct ThreadRegistration {
    registry: Arc<ThreadKindRegistry>,
    thread: ThreadId,
    kind: ThreadKind,
    token: u64,
}

impl ThreadRegistration {
    /// The registered kind.
    #[must_use]
    pub const fn kind(&self) -> ThreadKind {
        self.kind
    }

    /// Keeps the registration without a guard.
    ///
    /// For threads owned by a runtime that only offers start/stop hooks; the
    /// stop hook must call [`ThreadKindRegistry::unregister`].
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl fmt::Debug for ThreadRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRegistration")
            .field("thread", &self.thread)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        // A re-registration from the same thread hands the entry to the
        // newer guard.
        let mut kinds = self.registry.kinds.lock();
        if kinds.get(&self.thread).is_some_and(|entry| entry.token == self.token) {
            kinds.remove(&self.thread);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_unregistered_thread_is_anonymous() {
        let registry = ThreadKindRegistry::new();
        assert_eq!(registry.get_kind(), ThreadKind::Anonymous);
    }

    #[test]
    fn test_register_and_drop() {
        let registry = ThreadKindRegistry::new();
        {
            let reg = registry.register(ThreadKind::Worker).unwrap();
            assert_eq!(reg.kind(), ThreadKind::Worker);
            assert_eq!(registry.get_kind(), ThreadKind::Worker);
        }
        assert_eq!(registry.get_kind(), ThreadKind::Anonymous);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ThreadKindRegistry::new();
        registry.register(ThreadKind::Timer).unwrap().detach();
        assert!(registry.is_current(ThreadKind::Timer));
        registry.unregister();
        registry.unregister();
        assert_eq!(registry.get_kind(), ThreadKind::Anonymous);
        assert_eq!(registry.live_threads(), 0);
    }

    #[test]
    fn test_singleton_enforced_until_holder_exits() {
        let registry = ThreadKindRegistry::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<()>();

        let holder = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let _reg = registry.register(ThreadKind::Render).unwrap();
                ready_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        ready_rx.recv().unwrap();

        let err = registry.register(ThreadKind::Render).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateSingleton {
                kind: ThreadKind::Render,
                ..
            }
        ));

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        let reg = registry.register(ThreadKind::Render).unwrap();
        assert_eq!(registry.holder(ThreadKind::Render), Some(thread::current().id()));
        drop(reg);
    }

    #[test]
    fn test_non_singleton_kinds_coexist() {
        let registry = ThreadKindRegistry::new();
        let _mine = registry.register(ThreadKind::Worker).unwrap();
        let remote = Arc::clone(&registry);
        let ok = thread::spawn(move || remote.register(ThreadKind::Worker).is_ok())
            .join()
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_reregister_replaces_kind() {
        let registry = ThreadKindRegistry::new();
        let first = registry.register(ThreadKind::Worker).unwrap();
        let second = registry.register(ThreadKind::Event).unwrap();
        assert_eq!(registry.get_kind(), ThreadKind::Event);

        // The stale guard must not remove the newer registration.
        drop(first);
        assert_eq!(registry.get_kind(), ThreadKind::Event);
        drop(second);
        assert_eq!(registry.get_kind(), ThreadKind::Anonymous);
    }

    #[test]
    fn test_stale_guard_of_same_kind_keeps_newer_registration() {
        let registry = ThreadKindRegistry::new();
        let older = registry.register(ThreadKind::Render).unwrap();
        let newer = registry.register(ThreadKind::Render).unwrap();

        drop(older);
        assert_eq!(registry.get_kind(), ThreadKind::Render);
        assert_eq!(registry.holder(ThreadKind::Render), Some(thread::current().id()));

        drop(newer);
        assert_eq!(registry.get_kind(), ThreadKind::Anonymous);
    }

    #[test]
    fn test_global_is_shared() {
        let a = ThreadKindRegistry::global();
        let b = ThreadKindRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
