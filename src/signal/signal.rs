use crate::runtime::{NodeId, ReactiveRuntime};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// A reactive cell that holds a value and notifies dependents when replaced.
///
/// Reads through [`Signal::get`] or [`Signal::with`] are tracked by the
/// observer that is currently running; [`Signal::peek`] is not.
#[derive(Clone)]
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    id: NodeId,
    runtime: Arc<ReactiveRuntime>,
    _dependencies: Arc<Mutex<Vec<WatchGuard>>>,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal in the current runtime.
    pub fn new(initial: T) -> Self {
        Self::new_in(ReactiveRuntime::current(), initial)
    }

    /// Create a new signal in a specific runtime.
    pub fn new_in(runtime: Arc<ReactiveRuntime>, initial: T) -> Self {
        let id = runtime.next_id();
        Self {
            value: Arc::new(RwLock::new(initial)),
            id,
            runtime,
            _dependencies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the current value, registering a dependency.
    pub fn get(&self) -> T {
        self.runtime.track_read(self.id);
        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Replace the value and notify dependents.
    pub fn set(&self, new_value: T) {
        *self.value.write() = new_value;
        self.runtime.notify(self.id);
    }

    /// Update the value in place and notify dependents.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut value = self.value.write();
            f(&mut value);
        }
        self.runtime.notify(self.id);
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.runtime.track_read(self.id);
        let value = self.value.read();
        f(&value)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The runtime this signal notifies.
    pub fn runtime(&self) -> &Arc<ReactiveRuntime> {
        &self.runtime
    }

    /// Call `callback` after every replacement of the value.
    ///
    /// Callbacks run in subscription order and receive the value current
    /// when they run. A callback that writes the signal notifies every
    /// subscriber again before the outer notification continues, so later
    /// subscribers may skip the intermediate value but never see an older
    /// one after a newer one.
    ///
    /// The subscription lasts as long as the returned guard.
    pub fn subscribe<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let observer_id = self.runtime.next_id();
        let value = Arc::clone(&self.value);

        self.runtime.register_effect(observer_id, move || {
            let current = value.read().clone();
            callback(current);
        });
        self.runtime
            .with_observer(observer_id, || self.runtime.track_read(self.id));

        WatchGuard {
            observer_id,
            runtime: Arc::downgrade(&self.runtime),
        }
    }

    /// Like [`Signal::subscribe`], but also calls `callback` immediately.
    pub fn watch<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let subscribed = Arc::clone(&callback);
        let guard = self.subscribe(move |value| subscribed(value));
        callback(self.peek());
        guard
    }

    /// Create a derived signal by applying a function to this signal's value.
    pub fn map<U, F>(&self, f: F) -> Signal<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let derived = Signal::new_in(Arc::clone(&self.runtime), self.with(&f));
        let target = derived.clone();
        let guard = self.subscribe(move |value| target.set(f(&value)));
        derived._dependencies.lock().push(guard);
        derived
    }
}

/// Read half of a signal created by [`create_signal`].
#[derive(Clone)]
pub struct ReadSignal<T>(Signal<T>);

impl<T: Clone + Send + Sync + 'static> ReadSignal<T> {
    pub fn get(&self) -> T {
        self.0.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with(f)
    }
}

/// Write half of a signal created by [`create_signal`].
#[derive(Clone)]
pub struct WriteSignal<T>(Signal<T>);

impl<T: Clone + Send + Sync + 'static> WriteSignal<T> {
    pub fn set(&self, value: T) {
        self.0.set(value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.0.update(f);
    }
}

/// Create a signal split into its read and write halves.
pub fn create_signal<T: Clone + Send + Sync + 'static>(initial: T) -> (ReadSignal<T>, WriteSignal<T>) {
    let signal = Signal::new(initial);
    (ReadSignal(signal.clone()), WriteSignal(signal))
}

/// RAII guard for signal subscriptions.
pub struct WatchGuard {
    observer_id: NodeId,
    runtime: Weak<ReactiveRuntime>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_observer(self.observer_id);
        }
    }
}
