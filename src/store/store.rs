use super::config::StoreConfig;
use super::ledger::{ActionRecord, Ledger};
use super::persistence::KeyValueStorage;
use crate::error::StorageError;
use crate::runtime::ReactiveRuntime;
use crate::signal::{Memo, Signal, WatchGuard};
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Tracing target for state-transition events.
pub const DEVTOOLS_TARGET: &str = "tincan_session::devtools";

/// A state shape a [`Store`] can hold.
///
/// Shapes that carry a loading flag or an error message expose them here so
/// [`Store::set_loading`] and [`Store::set_error`] can reach them; shapes
/// without those fields keep the defaults and the helpers do nothing.
///
/// A store checks the accessors once, on its initial state, so whether they
/// return `Some` must not depend on the value.
pub trait StoreState: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn loading_mut(&mut self) -> Option<&mut bool> {
        None
    }

    fn error_mut(&mut self) -> Option<&mut Option<String>> {
        None
    }
}

/// Point-in-time copy of a store for inspection and restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: StoreState")]
pub struct StoreSnapshot<T> {
    pub state: T,
    pub history: Vec<T>,
    pub actions: Vec<ActionRecord>,
}

struct StoreInner<T: StoreState> {
    name: String,
    initial: T,
    config: StoreConfig,
    cell: Signal<T>,
    ledger: Mutex<Ledger<T>>,
    // Serializes commits; reentrant so subscribers may commit in turn.
    commit: ReentrantMutex<()>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    write_through: Mutex<Option<WatchGuard>>,
    has_loading: bool,
    has_error: bool,
}

/// A reactive state container with history, an action log and persistence.
///
/// Every transition replaces the whole state: history and the action log
/// are updated before the new value becomes visible, so subscribers and
/// selectors never see a state without its bookkeeping.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tincan_session::store::{Store, StoreState};
///
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// struct Counter {
///     count: u32,
/// }
///
/// impl StoreState for Counter {}
///
/// let store = Store::new(Counter::default());
/// store.patch_state(|s| s.count += 1);
/// assert_eq!(store.get().count, 1);
///
/// store.undo();
/// assert_eq!(store.get().count, 0);
/// ```
pub struct Store<T: StoreState> {
    inner: Arc<StoreInner<T>>,
}

/// Builder for a named, configured [`Store`].
pub struct StoreBuilder<T: StoreState> {
    name: String,
    initial: T,
    config: StoreConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    runtime: Option<Arc<ReactiveRuntime>>,
}

impl<T: StoreState> StoreBuilder<T> {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable adapter; without one persistence is skipped.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn maybe_storage(mut self, storage: Option<Arc<dyn KeyValueStorage>>) -> Self {
        self.storage = storage;
        self
    }

    pub fn runtime(mut self, runtime: Arc<ReactiveRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Store<T> {
        let runtime = self.runtime.unwrap_or_else(ReactiveRuntime::current);
        let mut initial = self.initial;
        let has_loading = initial.loading_mut().is_some();
        let has_error = initial.error_mut().is_some();
        let store = Store {
            inner: Arc::new(StoreInner {
                cell: Signal::new_in(runtime, initial.clone()),
                name: self.name,
                initial,
                config: self.config,
                ledger: Mutex::new(Ledger::new()),
                commit: ReentrantMutex::new(()),
                storage: self.storage,
                write_through: Mutex::new(None),
                has_loading,
                has_error,
            }),
        };

        if let Some(storage) = store.persistence() {
            store.load_persisted(storage.as_ref());
            store.install_write_through(storage);
        }
        store
    }
}

impl<T: StoreState> Store<T> {
    /// Create an in-memory store with the default configuration.
    pub fn new(initial: T) -> Self {
        Self::builder("STORE", initial).build()
    }

    pub fn builder(name: impl Into<String>, initial: T) -> StoreBuilder<T> {
        StoreBuilder {
            name: name.into(),
            initial,
            config: StoreConfig::default(),
            storage: None,
            runtime: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The declared initial state.
    pub fn initial_state(&self) -> &T {
        &self.inner.initial
    }

    /// Current state; tracked when read inside an effect or memo.
    pub fn get(&self) -> T {
        self.inner.cell.get()
    }

    /// Read the current state without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.inner.cell.with(f)
    }

    /// Replace the state with `updater(previous)` under action `SET_STATE`.
    pub fn set_state<F>(&self, updater: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.set_state_as("SET_STATE", updater);
    }

    /// Replace the state with `updater(previous)` under the given action.
    pub fn set_state_as<F>(&self, action: &str, updater: F)
    where
        F: FnOnce(&T) -> T,
    {
        let _commit = self.inner.commit.lock();
        let previous = self.inner.cell.peek();
        let next = updater(&previous);
        let payload = serde_json::to_value(&next).ok();
        {
            let mut ledger = self.inner.ledger.lock();
            ledger.push_history(previous, self.inner.config.history_limit());
            ledger.record(ActionRecord::new(&self.inner.name, action, payload));
        }
        self.emit_devtools(action, &next);
        self.inner.cell.set(next);
    }

    /// Apply `patch` to a copy of the state under action `PATCH_STATE`.
    pub fn patch_state<F>(&self, patch: F)
    where
        F: FnOnce(&mut T),
    {
        self.patch_state_as("PATCH_STATE", patch);
    }

    pub fn patch_state_as<F>(&self, action: &str, patch: F)
    where
        F: FnOnce(&mut T),
    {
        self.set_state_as(action, |state| {
            let mut next = state.clone();
            patch(&mut next);
            next
        });
    }

    /// Go back to the declared initial state.
    pub fn reset_state(&self) {
        self.reset_state_as("RESET_STATE");
    }

    pub fn reset_state_as(&self, action: &str) {
        let initial = self.inner.initial.clone();
        self.set_state_as(action, move |_| initial);
    }

    /// Set the loading flag, if the state shape has one.
    ///
    /// The action is `SET_LOADING_<operation>` or plain `SET_LOADING`.
    pub fn set_loading(&self, is_loading: bool, operation: Option<&str>) {
        if !self.inner.has_loading {
            return;
        }
        let action = match operation {
            Some(op) => format!("SET_LOADING_{op}"),
            None => "SET_LOADING".to_string(),
        };
        self.patch_state_as(&action, |state| {
            if let Some(flag) = state.loading_mut() {
                *flag = is_loading;
            }
        });
    }

    /// Set the error message, if the state shape has one.
    pub fn set_error(&self, error: Option<String>, action: Option<&str>) {
        if !self.inner.has_error {
            return;
        }
        self.patch_state_as(action.unwrap_or("SET_ERROR"), |state| {
            if let Some(slot) = state.error_mut() {
                *slot = error;
            }
        });
    }

    pub fn clear_error(&self) {
        self.set_error(None, Some("CLEAR_ERROR"));
    }

    /// Make the most recent history entry current again.
    ///
    /// Does nothing when history is empty.
    pub fn undo(&self) {
        let _commit = self.inner.commit.lock();
        let previous = {
            let mut ledger = self.inner.ledger.lock();
            let Some(previous) = ledger.pop_history() else {
                return;
            };
            ledger.record(ActionRecord::new(&self.inner.name, "UNDO", None));
            previous
        };
        self.emit_devtools("UNDO", &previous);
        self.inner.cell.set(previous);
    }

    pub fn can_undo(&self) -> bool {
        self.inner.ledger.lock().history_len() > 0
    }

    /// Previous states, most recent first.
    pub fn history(&self) -> Vec<T> {
        self.inner.ledger.lock().history()
    }

    /// Logged actions, most recent first.
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.inner.ledger.lock().actions()
    }

    pub fn last_action(&self) -> Option<ActionRecord> {
        self.inner.ledger.lock().last_action().cloned()
    }

    /// A lazily recomputed projection of the state.
    pub fn select<R, F>(&self, selector: F) -> Memo<R>
    where
        R: Clone + Send + Sync + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let cell = self.inner.cell.clone();
        Memo::new_in(Arc::clone(cell.runtime()), move || cell.with(&selector))
    }

    /// Call `callback` with every committed state.
    ///
    /// Subscribers run in the order they subscribed and receive the state
    /// current when they run. A subscriber that commits again notifies
    /// everyone with the newer state first, so later subscribers may never
    /// see the state it reacted to, but never see states out of order.
    pub fn subscribe<F>(&self, callback: F) -> WatchGuard
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.cell.subscribe(move |state| callback(&state))
    }

    /// The runtime the store's cell and selectors live in.
    pub fn runtime(&self) -> Arc<ReactiveRuntime> {
        Arc::clone(self.inner.cell.runtime())
    }

    pub fn snapshot(&self) -> StoreSnapshot<T> {
        let _commit = self.inner.commit.lock();
        let ledger = self.inner.ledger.lock();
        StoreSnapshot {
            state: self.inner.cell.peek(),
            history: ledger.history(),
            actions: ledger.actions(),
        }
    }

    /// Replace the state with a snapshot's state, without touching history.
    pub fn load_snapshot(&self, state: T) {
        self.commit_untracked("LOAD_SNAPSHOT", state, None);
    }

    fn commit_untracked(&self, action: &str, state: T, payload: Option<Value>) {
        let _commit = self.inner.commit.lock();
        self.inner
            .ledger
            .lock()
            .record(ActionRecord::new(&self.inner.name, action, payload));
        self.emit_devtools(action, &state);
        self.inner.cell.set(state);
    }

    fn log_action(&self, action: &str, payload: Option<Value>) {
        self.inner
            .ledger
            .lock()
            .record(ActionRecord::new(&self.inner.name, action, payload));
    }

    fn emit_devtools(&self, action: &str, state: &T) {
        if !self.inner.config.enable_dev_tools {
            return;
        }
        let state = serde_json::to_string(state).unwrap_or_default();
        tracing::debug!(
            target: DEVTOOLS_TARGET,
            store = %self.inner.name,
            action = %format!("{}/{}", self.inner.name, action),
            %state,
            "action committed"
        );
    }

    fn persistence(&self) -> Option<Arc<dyn KeyValueStorage>> {
        if !self.inner.config.enable_persistence {
            return None;
        }
        self.inner.storage.clone()
    }

    fn persistence_key(&self) -> String {
        self.inner.config.resolved_key(&self.inner.name)
    }

    fn load_persisted(&self, storage: &dyn KeyValueStorage) {
        let key = self.persistence_key();
        let restored = storage
            .get(&key)
            .and_then(|raw| raw.map(|raw| merge_over(&self.inner.initial, &raw, &key)).transpose());

        match restored {
            Ok(None) => {}
            Ok(Some(state)) => {
                self.commit_untracked("LOAD_PERSISTED_STATE", state, None);
                tracing::debug!(store = %self.inner.name, %key, "restored persisted state");
            }
            Err(error) => {
                tracing::error!(
                    store = %self.inner.name,
                    %key,
                    %error,
                    "failed to load persisted state, keeping initial state"
                );
                self.log_action(
                    "LOAD_PERSISTED_STATE_ERROR",
                    Some(Value::String(error.to_string())),
                );
            }
        }
    }

    fn install_write_through(&self, storage: Arc<dyn KeyValueStorage>) {
        let key = self.persistence_key();
        let name = self.inner.name.clone();
        let guard = self.inner.cell.subscribe(move |state| {
            let written = serde_json::to_string(&state)
                .map_err(StorageError::from)
                .and_then(|raw| storage.set(&key, &raw));
            if let Err(error) = written {
                tracing::error!(store = %name, %key, %error, "failed to persist state");
            }
        });
        *self.inner.write_through.lock() = Some(guard);
    }
}

impl<T: StoreState> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Overlay the persisted object's fields on the initial state.
fn merge_over<T: StoreState>(initial: &T, raw: &str, key: &str) -> Result<T, StorageError> {
    let persisted: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = persisted else {
        return Err(StorageError::NotAnObject(key.to_string()));
    };
    let mut merged = serde_json::to_value(initial)?;
    match merged.as_object_mut() {
        Some(base) => base.extend(fields),
        None => return Err(StorageError::NotAnObject(key.to_string())),
    }
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct AppState {
        count: usize,
        name: String,
        is_loading: bool,
        error: Option<String>,
    }

    impl StoreState for AppState {
        fn loading_mut(&mut self) -> Option<&mut bool> {
            Some(&mut self.is_loading)
        }

        fn error_mut(&mut self) -> Option<&mut Option<String>> {
            Some(&mut self.error)
        }
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Bare {
        count: usize,
    }

    impl StoreState for Bare {}

    fn labels<T: StoreState>(store: &Store<T>) -> Vec<String> {
        store.actions().into_iter().map(|a| a.kind).collect()
    }

    #[test]
    fn set_state_records_history_and_action() {
        let store = Store::builder("APP", AppState::default()).build();

        store.set_state(|s| AppState { count: s.count + 1, ..s.clone() });
        store.patch_state_as("RENAME", |s| s.name = "updated".into());

        assert_eq!(store.get().count, 1);
        assert_eq!(store.get().name, "updated");
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history()[0].count, 1);
        assert_eq!(store.history()[1].count, 0);
        assert_eq!(labels(&store), vec!["APP/RENAME", "APP/SET_STATE"]);
    }

    #[test]
    fn subscribers_see_bookkeeping_already_applied() {
        let store = Store::builder("APP", AppState::default()).build();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let _guard = store.subscribe({
            let store = store.clone();
            let observed = Arc::clone(&observed);
            move |state| {
                let last = store.last_action().map(|a| a.kind).unwrap_or_default();
                observed.lock().push((state.count, store.history().len(), last));
            }
        });

        store.patch_state_as("BUMP", |s| s.count = 7);
        assert_eq!(*observed.lock(), vec![(7, 1, "APP/BUMP".to_string())]);
    }

    #[test]
    fn loading_and_error_helpers_need_the_fields() {
        let store = Store::builder("APP", AppState::default()).build();
        store.set_loading(true, Some("FETCH"));
        store.set_error(Some("boom".into()), None);
        assert!(store.get().is_loading);
        assert_eq!(store.get().error.as_deref(), Some("boom"));
        store.clear_error();
        assert_eq!(store.get().error, None);
        assert_eq!(
            labels(&store),
            vec!["APP/CLEAR_ERROR", "APP/SET_ERROR", "APP/SET_LOADING_FETCH"]
        );

        let bare = Store::new(Bare::default());
        bare.set_loading(true, None);
        bare.set_error(Some("ignored".into()), None);
        assert!(bare.actions().is_empty());
    }

    static TRACKED_CLONES: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Tracked {
        count: usize,
    }

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            TRACKED_CLONES.fetch_add(1, Ordering::SeqCst);
            Self { count: self.count }
        }
    }

    impl StoreState for Tracked {}

    #[test]
    fn missing_capabilities_cost_no_clones() {
        let store = Store::new(Tracked::default());
        let before = TRACKED_CLONES.load(Ordering::SeqCst);

        store.set_loading(true, Some("FETCH"));
        store.set_error(Some("ignored".into()), None);
        store.clear_error();

        assert_eq!(TRACKED_CLONES.load(Ordering::SeqCst), before);
        assert!(store.actions().is_empty());
    }

    #[test]
    fn reentrant_commit_reaches_later_subscribers_in_order() {
        let store = Store::builder("APP", Bare::default()).build();
        let _first = store.subscribe({
            let store = store.clone();
            move |state| {
                if state.count == 1 {
                    store.patch_state_as("FOLLOW_UP", |s| s.count = 2);
                }
            }
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _second = store.subscribe({
            let seen = Arc::clone(&seen);
            move |state| seen.lock().push(state.count)
        });

        store.patch_state_as("FIRST", |s| s.count = 1);

        let seen = seen.lock();
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last(), Some(&2));
        assert_eq!(labels(&store), vec!["APP/FOLLOW_UP", "APP/FIRST"]);
    }

    #[test]
    fn undo_pops_history() {
        let store = Store::new(Bare::default());
        store.undo();
        assert!(store.actions().is_empty());

        store.patch_state(|s| s.count = 1);
        store.patch_state(|s| s.count = 2);
        assert!(store.can_undo());

        store.undo();
        assert_eq!(store.get().count, 1);
        store.undo();
        assert_eq!(store.get().count, 0);
        assert!(!store.can_undo());
        assert_eq!(store.last_action().unwrap().kind, "STORE/UNDO");
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let store = Store::new(Bare { count: 3 });
        store.patch_state(|s| s.count = 10);
        store.reset_state();
        assert_eq!(store.get(), Bare { count: 3 });
        assert_eq!(store.last_action().unwrap().action(), "RESET_STATE");
    }

    #[test]
    fn history_disabled_keeps_nothing() {
        let store = Store::builder("APP", Bare::default())
            .config(StoreConfig::default().without_history())
            .build();
        store.patch_state(|s| s.count = 1);
        assert!(store.history().is_empty());
        assert!(!store.can_undo());
    }

    #[test]
    fn selectors_recompute_after_changes() {
        let store = Store::new(AppState::default());
        let doubled = store.select(|s| s.count * 2);
        assert_eq!(doubled.get(), 0);
        store.patch_state(|s| s.count = 21);
        assert_eq!(doubled.get(), 42);
    }

    #[test]
    fn persisted_fields_merge_over_initial_state() {
        let storage = Arc::new(MemoryStorage::new().with_entry("app-store", r#"{"count":9}"#));
        let store = Store::builder("APP", AppState { name: "init".into(), ..Default::default() })
            .config(StoreConfig::default().with_persistence("app-store"))
            .storage(storage.clone())
            .build();

        assert_eq!(store.get().count, 9);
        assert_eq!(store.get().name, "init");
        assert_eq!(labels(&store), vec!["APP/LOAD_PERSISTED_STATE"]);
        assert!(store.history().is_empty());

        store.patch_state(|s| s.count = 10);
        let written = storage.get("app-store").unwrap().unwrap();
        let written: AppState = serde_json::from_str(&written).unwrap();
        assert_eq!(written.count, 10);
    }

    #[test]
    fn non_object_persisted_state_is_rejected() {
        let storage = Arc::new(MemoryStorage::new().with_entry("app-store", "[1,2]"));
        let store = Store::builder("APP", Bare::default())
            .config(StoreConfig::default().with_persistence("app-store"))
            .storage(storage)
            .build();
        assert_eq!(store.get(), Bare::default());
        assert_eq!(labels(&store), vec!["APP/LOAD_PERSISTED_STATE_ERROR"]);
    }

    struct FailingStorage {
        writes: AtomicUsize,
    }

    impl KeyValueStorage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("offline".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Unavailable("offline".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn storage_failures_are_absorbed() {
        let storage = Arc::new(FailingStorage {
            writes: AtomicUsize::new(0),
        });
        let store = Store::builder("APP", Bare::default())
            .config(StoreConfig::default().with_persistence("app-store"))
            .storage(storage.clone())
            .build();

        store.patch_state(|s| s.count = 1);
        assert_eq!(store.get().count, 1);
        assert_eq!(storage.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshot_round_trip_does_not_touch_history() {
        let store = Store::new(Bare::default());
        store.patch_state(|s| s.count = 4);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.state.count, 4);
        assert_eq!(snapshot.history.len(), 1);

        store.load_snapshot(Bare { count: 99 });
        assert_eq!(store.get().count, 99);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.last_action().unwrap().action(), "LOAD_SNAPSHOT");
    }
}
