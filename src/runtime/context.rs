use parking_lot::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Identifier of a node (signal, memo or effect) in a reactive graph.
pub type NodeId = usize;

type Observer = Arc<dyn Fn() + Send + Sync>;

/// Dependency graph owned by one runtime.
#[derive(Default)]
struct Graph {
    // source -> observers that read it
    dependents: HashMap<NodeId, HashSet<NodeId>>,
    // observer -> sources it read
    sources: HashMap<NodeId, HashSet<NodeId>>,
    effects: HashMap<NodeId, Observer>,
    memos: HashMap<NodeId, MemoState>,
}

/// Invalidation bookkeeping for one memo.
#[derive(Clone, Copy)]
struct MemoState {
    // bumped on every invalidation
    generation: u64,
    dirty: bool,
}

impl Graph {
    /// Mark every memo downstream of `source_id` dirty and collect the
    /// downstream effects, each once, in creation order.
    fn invalidate(&mut self, source_id: NodeId) -> Vec<(NodeId, Observer)> {
        let mut visited = HashSet::new();
        let mut pending = vec![source_id];
        let mut effects = Vec::new();

        while let Some(node_id) = pending.pop() {
            let Some(observers) = self.dependents.get(&node_id) else {
                continue;
            };
            for &observer_id in observers {
                if !visited.insert(observer_id) {
                    continue;
                }
                if let Some(memo) = self.memos.get_mut(&observer_id) {
                    memo.generation += 1;
                    memo.dirty = true;
                    pending.push(observer_id);
                } else if let Some(effect) = self.effects.get(&observer_id) {
                    effects.push((observer_id, Arc::clone(effect)));
                }
            }
        }

        effects.sort_unstable_by_key(|(observer_id, _)| *observer_id);
        effects
    }

    fn unlink(&mut self, observer_id: NodeId) {
        if let Some(sources) = self.sources.remove(&observer_id) {
            for source_id in sources {
                if let Some(dependents) = self.dependents.get_mut(&source_id) {
                    dependents.remove(&observer_id);
                }
            }
        }
    }
}

thread_local! {
    // Stack of scoped runtimes installed on this thread.
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = const { RefCell::new(Vec::new()) };
    // (runtime address, observer) currently collecting reads on this thread.
    static CURRENT_OBSERVER: Cell<Option<(usize, NodeId)>> = const { Cell::new(None) };
}

/// Reactive runtime tracking dependencies between signals, memos and effects.
///
/// Every primitive remembers the runtime it was created in, so a signal
/// written from any thread notifies the graph it belongs to. The observer
/// that is currently collecting reads is tracked per thread.
///
/// # Examples
///
/// Using the default global runtime:
///
/// ```
/// use tincan_session::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using a scoped runtime for isolation:
///
/// ```
/// use tincan_session::runtime::ReactiveRuntime;
/// use tincan_session::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// ```
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
    graph: Mutex<Graph>,
}

/// Pops the scoped runtime even when the scoped closure panics.
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Restores the previous observer even when the observed closure panics.
struct ObserverGuard(Option<(usize, NodeId)>);

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        CURRENT_OBSERVER.with(|current| current.set(self.0));
    }
}

impl ReactiveRuntime {
    /// Create a new isolated runtime.
    pub fn new() -> Arc<Self> {
        Arc::new(ReactiveRuntime {
            next_id: AtomicUsize::new(0),
            graph: Mutex::new(Graph::default()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Primitives created inside the closure belong to the new runtime.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(), f)
    }

    /// Get or create the global runtime used when no scope is active.
    pub fn global() -> Arc<Self> {
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// The innermost scoped runtime on this thread, or the global one.
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_else(Self::global))
    }

    /// Run a function with `runtime` installed as the current runtime.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| stack.borrow_mut().push(runtime));
        let _guard = ScopeGuard;
        f()
    }

    /// Drop every tracked dependency, effect and memo flag.
    pub fn clear(&self) {
        *self.graph.lock() = Graph::default();
        self.next_id.store(0, Ordering::SeqCst);
    }

    /// Generate the next unique node id.
    pub fn next_id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Record that the current observer (if any) read `source_id`.
    pub fn track_read(&self, source_id: NodeId) {
        let Some((runtime, observer_id)) = CURRENT_OBSERVER.with(Cell::get) else {
            return;
        };
        if runtime != self.key() || observer_id == source_id {
            return;
        }
        let mut graph = self.graph.lock();
        graph
            .dependents
            .entry(source_id)
            .or_default()
            .insert(observer_id);
        graph.sources.entry(observer_id).or_default().insert(source_id);
    }

    /// Notify everything that read `source_id`.
    ///
    /// Every memo downstream of the source is invalidated before any effect
    /// runs, so an effect never observes one memo updated and another stale.
    /// Each downstream effect then runs once, synchronously.
    pub fn notify(&self, source_id: NodeId) {
        let effects = self.graph.lock().invalidate(source_id);

        for (observer_id, effect) in effects {
            // an earlier effect may have dropped this one
            if !self.graph.lock().effects.contains_key(&observer_id) {
                continue;
            }
            self.with_observer(observer_id, || effect());
        }
    }

    /// Register `f` as the body of effect `observer_id`.
    pub fn register_effect<F>(&self, observer_id: NodeId, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut graph = self.graph.lock();
        graph.unlink(observer_id);
        graph.effects.insert(observer_id, Arc::new(f));
    }

    /// Forget an observer and every edge leading to it.
    pub fn remove_observer(&self, observer_id: NodeId) {
        let mut graph = self.graph.lock();
        graph.effects.remove(&observer_id);
        graph.memos.remove(&observer_id);
        graph.unlink(observer_id);
    }

    /// Run `f` with `observer_id` collecting the reads it performs.
    pub fn with_observer<F, R>(&self, observer_id: NodeId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let previous =
            CURRENT_OBSERVER.with(|current| current.replace(Some((self.key(), observer_id))));
        let _guard = ObserverGuard(previous);
        f()
    }

    /// Run `f` without any observer collecting its reads.
    pub fn untracked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let previous = CURRENT_OBSERVER.with(|current| current.replace(None));
        let _guard = ObserverGuard(previous);
        f()
    }

    /// Register a memo; it starts dirty so the first read computes it.
    pub fn register_memo(&self, memo_id: NodeId) {
        self.graph.lock().memos.insert(
            memo_id,
            MemoState {
                generation: 0,
                dirty: true,
            },
        );
    }

    /// Invalidation generation of a memo and whether it must recompute.
    pub fn memo_state(&self, memo_id: NodeId) -> (u64, bool) {
        self.graph
            .lock()
            .memos
            .get(&memo_id)
            .map_or((0, true), |state| (state.generation, state.dirty))
    }

    /// Mark a memo clean, unless it was invalidated after `generation`.
    pub fn mark_memo_clean(&self, memo_id: NodeId, generation: u64) {
        if let Some(state) = self.graph.lock().memos.get_mut(&memo_id) {
            if state.generation == generation {
                state.dirty = false;
            }
        }
    }

    /// Number of observers currently depending on `source_id`.
    pub fn dependent_count(&self, source_id: NodeId) -> usize {
        self.graph
            .lock()
            .dependents
            .get(&source_id)
            .map_or(0, HashSet::len)
    }
}
