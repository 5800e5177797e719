//! Store definition tying snapshots and emitters together.

use crate::effects::Effect;
use crate::emitter::{CycleReporter, Emitter, EmitterConfig, Observable};
use crate::error::{Result, StoreError};
use crate::snapshot::{
    Derivations, Derive, LegacySnapshot, Snapshot, SnapshotContext, SnapshotRepr,
};
use crate::types::{Change, State, StateKey, StateValue};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Environment variable read by [`StoreOptions::from_env`].
pub const DEV_MODE_ENV: &str = "SNAPSTORE_DEV_MODE";

/// Store configuration.
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Detect and report cyclic re-entrant sets.
    /// Default: false
    pub dev_mode: bool,

    /// Where cycle diagnostics go (None = `tracing::warn!`).
    pub cycle_reporter: Option<CycleReporter>,
}

impl StoreOptions {
    /// Options with dev mode on.
    pub fn dev() -> Self {
        Self {
            dev_mode: true,
            ..Default::default()
        }
    }

    /// Dev mode from `SNAPSTORE_DEV_MODE` (`1`/`true`/`0`/`false`), falling
    /// back to whether this is a debug build.
    pub fn from_env() -> Self {
        let dev_mode = match std::env::var(DEV_MODE_ENV) {
            Ok(value) => parse_flag(&value).unwrap_or(cfg!(debug_assertions)),
            Err(_) => cfg!(debug_assertions),
        };
        Self {
            dev_mode,
            ..Default::default()
        }
    }

    pub fn with_cycle_reporter(mut self, reporter: CycleReporter) -> Self {
        self.cycle_reporter = Some(reporter);
        self
    }

    fn emitter_config(&self) -> EmitterConfig {
        EmitterConfig {
            dev_mode: self.dev_mode,
            cycle_reporter: self.cycle_reporter.clone(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("dev_mode", &self.dev_mode)
            .field("cycle_reporter", &self.cycle_reporter.is_some())
            .finish()
    }
}

pub(crate) struct StoreInner<K, V, S> {
    /// Replaced on every set, never mutated.
    snapshot: RwLock<Arc<S>>,
    /// Per-key new values.
    changes: Emitter<K, V>,
    /// Change records for every key.
    all_changes: Emitter<K, Change<K, V>>,
    setters: Mutex<BTreeMap<K, Arc<Setter<K, V, S>>>>,
    derivations: Arc<Derivations<K, V, S>>,
    options: StoreOptions,
}

/// A keyed state container.
///
/// `S` selects the snapshot representation; use the [`Store`] and
/// [`LegacyStore`] aliases. Handles are cheap to clone and share one store.
///
/// A `set` installs a new snapshot, emits the new value to [`on`] listeners
/// of that key, then emits a [`Change`] to [`on_all`] listeners. All of it
/// happens before `set` returns.
///
/// [`on`]: StoreDefinition::on
/// [`on_all`]: StoreDefinition::on_all
pub struct StoreDefinition<K, V, S> {
    inner: Arc<StoreInner<K, V, S>>,
}

/// Store backed by frozen [`Snapshot`]s.
pub type Store<K, V> = StoreDefinition<K, V, Snapshot<K, V>>;

/// Store backed by [`LegacySnapshot`]s.
pub type LegacyStore<K, V> = StoreDefinition<K, V, LegacySnapshot<K, V>>;

impl<K, V, S> StoreDefinition<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    /// Create a store from its initial state.
    pub fn new(initial: impl Into<State<K, V>>, options: StoreOptions) -> Self {
        Self::from_parts(initial.into(), Derivations::new(), options)
    }

    /// Start building a store with computed keys.
    pub fn builder(initial: impl Into<State<K, V>>) -> StoreBuilder<K, V, S> {
        StoreBuilder {
            initial: initial.into(),
            derivations: Derivations::new(),
            options: StoreOptions::default(),
        }
    }

    fn from_parts(state: State<K, V>, derivations: Derivations<K, V, S>, options: StoreOptions) -> Self {
        let derivations = Arc::new(derivations);
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<K, V, S>>| {
            let context = SnapshotContext {
                derivations: Arc::clone(&derivations),
                owner: WeakStore {
                    inner: weak.clone(),
                },
            };
            StoreInner {
                snapshot: RwLock::new(Arc::new(S::capture(state, context))),
                changes: Emitter::with_config(options.emitter_config()),
                all_changes: Emitter::with_config(options.emitter_config()),
                setters: Mutex::new(BTreeMap::new()),
                derivations,
                options,
            }
        });
        tracing::debug!(dev_mode = inner.options.dev_mode, "Store created");
        Self { inner }
    }

    // --- Reads ---

    /// Current value of a plain or computed key.
    pub fn get(&self, key: &K) -> Option<V> {
        // Computed keys may read the store again; don't hold the lock.
        let snapshot = self.get_state();
        snapshot.value(key)
    }

    /// The current snapshot.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// Alias of [`get_state`](Self::get_state).
    pub fn get_current_snapshot(&self) -> Arc<S> {
        self.get_state()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    // --- Writes ---

    /// Setter for `key`.
    ///
    /// Repeated calls for the same key return the same `Arc`. Fails for keys
    /// missing from the initial state and for computed keys.
    pub fn set(&self, key: &K) -> Result<Arc<Setter<K, V, S>>> {
        if self.inner.derivations.contains_key(key) {
            return Err(StoreError::ReadOnlyKey(format!("{:?}", key)));
        }

        let mut setters = self.inner.setters.lock();
        if let Some(setter) = setters.get(key) {
            return Ok(Arc::clone(setter));
        }
        if !self.inner.snapshot.read().state().contains_key(key) {
            return Err(StoreError::UnknownKey(format!("{:?}", key)));
        }

        let setter = Arc::new(Setter {
            key: key.clone(),
            store: self.downgrade(),
        });
        setters.insert(key.clone(), Arc::clone(&setter));
        Ok(setter)
    }

    fn apply(&self, key: &K, value: V) -> Result<()> {
        let previous_value = {
            let mut current = self.inner.snapshot.write();
            let previous_value = current
                .state()
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::UnknownKey(format!("{:?}", key)))?;
            let next = current.state().with(key.clone(), value.clone());
            *current = Arc::new(S::capture(next, self.context()));
            previous_value
        };
        tracing::debug!(?key, ?previous_value, ?value, "Store set");

        let keyed = self.inner.changes.emit(key, &value);
        let change = Change {
            key: key.clone(),
            previous_value,
            value,
        };
        let all = self.inner.all_changes.emit(key, &change);
        keyed.and(all)
    }

    fn context(&self) -> SnapshotContext<K, V, S> {
        SnapshotContext {
            derivations: Arc::clone(&self.inner.derivations),
            owner: self.downgrade(),
        }
    }

    // --- Subscriptions ---

    /// New values of `key`.
    pub fn on(&self, key: K) -> Observable<K, V> {
        self.inner.changes.on(key)
    }

    /// Change records for every key.
    pub fn on_all(&self) -> Observable<K, Change<K, V>> {
        self.inner.all_changes.all()
    }

    /// Whether anything listens to `key` through [`on`](Self::on).
    pub fn has_observers(&self, key: &K) -> bool {
        self.inner.changes.has_observers(key)
    }

    // --- Composition ---

    /// Apply an effect to this store.
    pub fn with<E>(self, effect: E) -> Result<Self>
    where
        E: Effect<Self>,
    {
        effect.apply(self)
    }

    pub fn downgrade(&self) -> WeakStore<K, V, S> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V, S> Clone for StoreDefinition<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, S> fmt::Debug for StoreDefinition<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", self.get_state().state())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Non-owning store handle held by snapshots and setters.
pub struct WeakStore<K, V, S> {
    inner: Weak<StoreInner<K, V, S>>,
}

impl<K, V, S> WeakStore<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    pub fn upgrade(&self) -> Option<StoreDefinition<K, V, S>> {
        self.inner.upgrade().map(|inner| StoreDefinition { inner })
    }

    /// `set(key)(value)` on the store, if it is still alive.
    pub fn set(&self, key: &K, value: V) -> Result<()> {
        let store = self.upgrade().ok_or(StoreError::StoreDropped)?;
        let setter = store.set(key)?;
        setter.call(value)
    }
}

impl<K, V, S> Clone for WeakStore<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Memoized setter for one key, returned by [`StoreDefinition::set`].
pub struct Setter<K, V, S> {
    key: K,
    store: WeakStore<K, V, S>,
}

impl<K, V, S> Setter<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Set the key to `value` and notify listeners.
    ///
    /// Always emits, even when `value` equals the current value. In dev mode a
    /// re-entrant set of a key whose listeners are still running installs the
    /// new snapshot, skips those listeners and returns
    /// [`StoreError::CyclicDependency`].
    pub fn call(&self, value: V) -> Result<()> {
        let store = self.store.upgrade().ok_or(StoreError::StoreDropped)?;
        store.apply(&self.key, value)
    }
}

impl<K: fmt::Debug, V, S> fmt::Debug for Setter<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter").field("key", &self.key).finish()
    }
}

/// Builder for stores with computed keys.
pub struct StoreBuilder<K, V, S> {
    initial: State<K, V>,
    derivations: Derivations<K, V, S>,
    options: StoreOptions,
}

impl<K, V, S> StoreBuilder<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.options.dev_mode = dev_mode;
        self
    }

    /// Declare a read-only key computed from each snapshot.
    pub fn computed<F>(mut self, key: K, derive: F) -> Self
    where
        F: Fn(&S) -> V + Send + Sync + 'static,
    {
        let derive: Derive<V, S> = Arc::new(derive);
        self.derivations.insert(key, derive);
        self
    }

    /// Fails if a computed key shadows a plain key.
    pub fn build(self) -> Result<StoreDefinition<K, V, S>> {
        if let Some(key) = self
            .derivations
            .keys()
            .find(|key| self.initial.contains_key(key))
        {
            return Err(StoreError::DuplicateKey(format!("{:?}", key)));
        }
        Ok(StoreDefinition::from_parts(
            self.initial,
            self.derivations,
            self.options,
        ))
    }
}
