use crate::runtime::{NodeId, ReactiveRuntime};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;

/// A memoized computed value that automatically tracks dependencies.
///
/// Memos only recompute when a dependency changed since the last read,
/// and always compute from the values committed at read time. A value
/// computed while a dependency was being written is returned once but
/// never treated as current.
#[derive(Clone)]
pub struct Memo<T> {
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    // value tagged with the generation it was computed at
    cached: Arc<RwLock<Option<(u64, T)>>>,
    id: NodeId,
    runtime: Arc<ReactiveRuntime>,
}

impl<T: Clone + Send + Sync + 'static> Memo<T> {
    /// Create a new memo in the current runtime.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_in(ReactiveRuntime::current(), compute)
    }

    /// Create a new memo in a specific runtime.
    pub fn new_in<F>(runtime: Arc<ReactiveRuntime>, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = runtime.next_id();
        runtime.register_memo(id);

        Self {
            compute: Arc::new(compute),
            cached: Arc::new(RwLock::new(None)),
            id,
            runtime,
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Read the memoized value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);

        let (generation, dirty) = self.runtime.memo_state(self.id);
        if !dirty {
            if let Some((_, value)) = self.cached.read().as_ref() {
                return f(value);
            }
        }

        let value = self.runtime.with_observer(self.id, || (self.compute)());
        let mut cached = self.cached.write();
        match cached.as_ref() {
            Some((stored, _)) if *stored > generation => {}
            _ => *cached = Some((generation, value)),
        }
        self.runtime.mark_memo_clean(self.id, generation);

        let cached = RwLockWriteGuard::downgrade(cached);
        match cached.as_ref() {
            Some((_, value)) => f(value),
            None => f(&(self.compute)()),
        }
    }
}

/// Create a new memoized computation.
///
/// # Example
///
/// ```
/// use tincan_session::{create_memo, Signal};
///
/// let count = Signal::new(5);
/// let doubled = create_memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 10);
/// ```
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}
