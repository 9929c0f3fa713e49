use crate::runtime::{NodeId, ReactiveRuntime};
use std::sync::{Arc, Weak};

/// A side effect that runs when its dependencies change.
///
/// Effects track every signal and memo read while they run and re-run
/// whenever one of those changes. The effect runs once on creation to
/// establish its dependencies and stops when dropped.
///
/// # Examples
///
/// ```
/// use tincan_session::{Effect, Signal};
/// use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
///
/// let signal = Signal::new(5);
/// let last_value = Arc::new(AtomicI32::new(0));
///
/// let _effect = Effect::new({
///     let signal = signal.clone();
///     let last_value = Arc::clone(&last_value);
///     move || last_value.store(signal.get(), Ordering::SeqCst)
/// });
/// assert_eq!(last_value.load(Ordering::SeqCst), 5);
///
/// signal.set(10);
/// assert_eq!(last_value.load(Ordering::SeqCst), 10);
/// ```
pub struct Effect {
    id: NodeId,
    runtime: Weak<ReactiveRuntime>,
}

impl Effect {
    /// Create a new effect in the current runtime.
    pub fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new_in(ReactiveRuntime::current(), effect)
    }

    /// Create a new effect in a specific runtime.
    pub fn new_in<F>(runtime: Arc<ReactiveRuntime>, effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = runtime.next_id();
        let effect = Arc::new(effect);
        let registered = Arc::clone(&effect);

        runtime.register_effect(id, move || registered());
        runtime.with_observer(id, || effect());

        Self {
            id,
            runtime: Arc::downgrade(&runtime),
        }
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.id);
        }
    }
}

/// Create a new effect that runs when dependencies change.
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
