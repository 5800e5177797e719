//! Keyed emitter with re-entrancy tracking.

use crate::error::{CyclicDependency, Result, StoreError};
use crate::types::{ListenerId, StateKey};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use super::types::{default_cycle_reporter, CycleReporter, EmitterConfig, Subscription, Topic};

type ListenerFn<V> = Box<dyn Fn(&V) + Send + Sync>;

/// Internal listener state.
struct Registered<V> {
    id: ListenerId,
    /// Cleared on unsubscribe so an in-progress emit skips it.
    active: AtomicBool,
    listener: ListenerFn<V>,
}

struct Registry<K, V> {
    by_key: BTreeMap<K, Vec<Arc<Registered<V>>>>,
    all: Vec<Arc<Registered<V>>>,
}

impl<K: StateKey, V> Registry<K, V> {
    fn remove(&mut self, topic: &Topic<K>, id: ListenerId) -> bool {
        match topic {
            Topic::Key(key) => {
                let Some(listeners) = self.by_key.get_mut(key) else {
                    return false;
                };
                let before = listeners.len();
                listeners.retain(|l| l.id != id);
                let removed = listeners.len() != before;
                if listeners.is_empty() {
                    self.by_key.remove(key);
                }
                removed
            }
            Topic::All => {
                let before = self.all.len();
                self.all.retain(|l| l.id != id);
                self.all.len() != before
            }
        }
    }
}

pub(crate) struct EmitterInner<K, V> {
    registry: RwLock<Registry<K, V>>,
    next_id: AtomicU64,
    dev_mode: bool,
    /// Keys emitted in the current synchronous call chain, per thread.
    in_flight: Mutex<HashMap<ThreadId, Vec<K>>>,
    reporter: CycleReporter,
}

impl<K: StateKey, V: 'static> EmitterInner<K, V> {
    fn register(self: &Arc<Self>, topic: Topic<K>, listener: ListenerFn<V>) -> Subscription {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = Arc::new(Registered {
            id,
            active: AtomicBool::new(true),
            listener,
        });

        {
            let mut registry = self.registry.write();
            match &topic {
                Topic::Key(key) => registry
                    .by_key
                    .entry(key.clone())
                    .or_default()
                    .push(Arc::clone(&entry)),
                Topic::All => registry.all.push(Arc::clone(&entry)),
            }
        }
        tracing::debug!(?topic, listener = id.0, "Listener subscribed");

        let emitter: Weak<Self> = Arc::downgrade(self);
        Subscription::new(
            id,
            Box::new(move || {
                entry.active.store(false, Ordering::SeqCst);
                if let Some(emitter) = emitter.upgrade() {
                    if emitter.registry.write().remove(&topic, id) {
                        tracing::debug!(?topic, listener = id.0, "Listener unsubscribed");
                    }
                }
            }),
        )
    }
}

/// Pops the emitting key when its emit returns or unwinds.
struct InFlightGuard<'a, K> {
    in_flight: &'a Mutex<HashMap<ThreadId, Vec<K>>>,
    thread: ThreadId,
}

impl<K> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if let Some(chain) = in_flight.get_mut(&self.thread) {
            chain.pop();
            if chain.is_empty() {
                in_flight.remove(&self.thread);
            }
        }
    }
}

/// Publish/subscribe primitive keyed by message name.
///
/// For one `emit`, listeners registered for that key run first, then
/// listeners registered through [`Emitter::all`], each group in subscription
/// order. Everything runs synchronously on the calling thread.
///
/// With `dev_mode` on, an emit of a key that is already being emitted further
/// up the same call chain is not dispatched. The cycle is handed to the
/// configured [`CycleReporter`] and `emit` returns
/// [`StoreError::CyclicDependency`]. A key leaves the chain as soon as its own
/// emit returns, so fan-out to the same key from sibling listeners is fine.
/// The chain belongs to one emitter: a loop through another store's emitter
/// shows up here as just the repeated key.
pub struct Emitter<K, V> {
    inner: Arc<EmitterInner<K, V>>,
}

impl<K: StateKey, V: 'static> Emitter<K, V> {
    /// Create an emitter with cycle detection off.
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                registry: RwLock::new(Registry {
                    by_key: BTreeMap::new(),
                    all: Vec::new(),
                }),
                next_id: AtomicU64::new(1),
                dev_mode: config.dev_mode,
                in_flight: Mutex::new(HashMap::new()),
                reporter: config.cycle_reporter.unwrap_or_else(default_cycle_reporter),
            }),
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.inner.dev_mode
    }

    /// Subscription source for one key.
    pub fn on(&self, key: K) -> Observable<K, V> {
        Observable {
            emitter: Arc::clone(&self.inner),
            topic: Topic::Key(key),
        }
    }

    /// Subscription source for every key.
    pub fn all(&self) -> Observable<K, V> {
        Observable {
            emitter: Arc::clone(&self.inner),
            topic: Topic::All,
        }
    }

    /// Dispatch `value` to the listeners of `key`, then to all-listeners.
    ///
    /// Emitting a key nobody listens to is a no-op. Listener panics are not
    /// caught.
    pub fn emit(&self, key: &K, value: &V) -> Result<()> {
        if !self.inner.dev_mode {
            self.dispatch(key, value);
            return Ok(());
        }

        let thread = thread::current().id();
        {
            let mut in_flight = self.inner.in_flight.lock();
            let chain = in_flight.entry(thread).or_default();
            if chain.contains(key) {
                let mut keys: Vec<String> = chain.iter().map(|k| format!("{:?}", k)).collect();
                keys.push(format!("{:?}", key));
                drop(in_flight);

                let cycle = CyclicDependency { chain: keys };
                (self.inner.reporter)(&cycle);
                return Err(StoreError::CyclicDependency(cycle));
            }
            chain.push(key.clone());
        }

        let _guard = InFlightGuard {
            in_flight: &self.inner.in_flight,
            thread,
        };
        self.dispatch(key, value);
        Ok(())
    }

    fn dispatch(&self, key: &K, value: &V) {
        // Copy the listener lists so listeners can (un)subscribe while we iterate.
        let (keyed, all) = {
            let registry = self.inner.registry.read();
            (
                registry.by_key.get(key).cloned().unwrap_or_default(),
                registry.all.clone(),
            )
        };

        tracing::trace!(
            ?key,
            keyed = keyed.len(),
            all = all.len(),
            "Emit"
        );

        for entry in keyed.iter().chain(all.iter()) {
            if entry.active.load(Ordering::SeqCst) {
                (entry.listener)(value);
            }
        }
    }

    /// Whether any listener is registered for exactly `key`.
    pub fn has_observers(&self, key: &K) -> bool {
        self.inner.registry.read().by_key.contains_key(key)
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.inner
            .registry
            .read()
            .by_key
            .get(key)
            .map_or(0, Vec::len)
    }

    pub fn all_listener_count(&self) -> usize {
        self.inner.registry.read().all.len()
    }
}

impl<K: StateKey, V: 'static> Default for Emitter<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for Emitter<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Subscription source returned by [`Emitter::on`] and [`Emitter::all`].
pub struct Observable<K, V> {
    emitter: Arc<EmitterInner<K, V>>,
    topic: Topic<K>,
}

impl<K: StateKey, V: 'static> Observable<K, V> {
    /// Register `listener`; it fires on every matching emit until unsubscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.emitter.register(self.topic.clone(), Box::new(listener))
    }

    pub fn topic(&self) -> &Topic<K> {
        &self.topic
    }
}
