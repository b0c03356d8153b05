//! Cancellable handles opened during a task run.
//!
//! Every in-flight request, the remux subprocess and any collaborator
//! resource (e.g. a headless browser) is registered here while it is open,
//! so the whole set can be torn down with one `terminate_all()` call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// What a registered handle controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Request,
    Process,
    Browser,
    Other,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Request => write!(f, "request"),
            ResourceKind::Process => write!(f, "process"),
            ResourceKind::Browser => write!(f, "browser"),
            ResourceKind::Other => write!(f, "other"),
        }
    }
}

/// A resource that can be forcibly stopped.
///
/// `terminate` may be called on a handle whose work already finished and
/// must then do nothing.
pub trait CancellableHandle: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn terminate(&self);
}

/// Aborts a spawned tokio task (used for segment requests).
pub struct TaskAbortHandle(pub AbortHandle);

impl CancellableHandle for TaskAbortHandle {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Request
    }

    fn terminate(&self) {
        self.0.abort();
    }
}

/// Fires a cancellation token; the owner reacts by killing its resource.
pub struct TokenHandle {
    kind: ResourceKind,
    token: CancellationToken,
}

impl TokenHandle {
    pub fn new(kind: ResourceKind, token: CancellationToken) -> Self {
        Self { kind, token }
    }
}

impl CancellableHandle for TokenHandle {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn terminate(&self) {
        self.token.cancel();
    }
}

/// Runs a closure once on termination. Lets collaborators register
/// resources this crate knows nothing about.
pub struct CallbackHandle {
    kind: ResourceKind,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CallbackHandle {
    pub fn new(kind: ResourceKind, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind,
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }
}

impl CancellableHandle for CallbackHandle {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn terminate(&self) {
        if let Some(callback) = self.callback.lock().take() {
            callback();
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, Box<dyn CancellableHandle>>,
    closed: bool,
}

/// The set of open handles of one task.
#[derive(Clone, Default)]
pub struct ResourceSet {
    registry: Arc<Mutex<Registry>>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle. It leaves the set when the returned guard is dropped.
    ///
    /// Registering after `terminate_all()` terminates the handle at once.
    pub fn register(&self, handle: impl CancellableHandle + 'static) -> ResourceGuard {
        let mut registry = self.registry.lock();
        if registry.closed {
            drop(registry);
            tracing::debug!("Resource set closed, terminating new {} handle", handle.kind());
            handle.terminate();
            return ResourceGuard {
                registry: Arc::clone(&self.registry),
                id: None,
            };
        }

        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.insert(id, Box::new(handle));

        ResourceGuard {
            registry: Arc::clone(&self.registry),
            id: Some(id),
        }
    }

    /// Terminate every open handle and refuse new ones.
    ///
    /// Returns how many handles were terminated. Calling it again is a no-op.
    pub fn terminate_all(&self) -> usize {
        let entries: Vec<Box<dyn CancellableHandle>> = {
            let mut registry = self.registry.lock();
            registry.closed = true;
            registry.entries.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &entries {
            tracing::debug!("Terminating {} handle", handle.kind());
            handle.terminate();
        }

        entries.len()
    }

    pub fn is_closed(&self) -> bool {
        self.registry.lock().closed
    }

    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open handles of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.registry
            .lock()
            .entries
            .values()
            .filter(|h| h.kind() == kind)
            .count()
    }
}

/// Releases (without terminating) a handle when dropped.
#[must_use = "dropping the guard releases the handle immediately"]
pub struct ResourceGuard {
    registry: Arc<Mutex<Registry>>,
    id: Option<u64>,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.registry.lock().entries.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(kind: ResourceKind, counter: &Arc<AtomicUsize>) -> CallbackHandle {
        let counter = Arc::clone(counter);
        CallbackHandle::new(kind, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_guard_releases_without_terminating() {
        let set = ResourceSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let guard = set.register(counting(ResourceKind::Browser, &hits));
        assert_eq!(set.count(ResourceKind::Browser), 1);

        drop(guard);
        assert!(set.is_empty());
        assert_eq!(set.terminate_all(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_terminate_all_is_idempotent() {
        let set = ResourceSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _a = set.register(counting(ResourceKind::Request, &hits));
        let _b = set.register(counting(ResourceKind::Process, &hits));

        assert_eq!(set.terminate_all(), 2);
        assert_eq!(set.terminate_all(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(set.is_closed());
    }

    #[test]
    fn test_register_after_close_terminates() {
        let set = ResourceSet::new();
        set.terminate_all();

        let token = CancellationToken::new();
        let _guard = set.register(TokenHandle::new(ResourceKind::Process, token.clone()));

        assert!(token.is_cancelled());
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_abort_handle_stops_task() {
        let set = ResourceSet::new();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let _guard = set.register(TaskAbortHandle(task.abort_handle()));

        set.terminate_all();
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
