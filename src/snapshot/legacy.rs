//! Accessor-style snapshots returning owned values.

use crate::error::Result;
use crate::store::WeakStore;
use crate::types::{State, StateKey, StateValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{Derivations, SnapshotContext, SnapshotRepr};

/// Accessor-style snapshot used by [`crate::LegacyStore`].
///
/// Reads return owned values. Computed keys are cached in a locked table the
/// first time they are read.
pub struct LegacySnapshot<K, V> {
    state: State<K, V>,
    derivations: Arc<Derivations<K, V, Self>>,
    computed: Mutex<BTreeMap<K, V>>,
    store: WeakStore<K, V, Self>,
}

impl<K: StateKey, V: StateValue> LegacySnapshot<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(value) = self.state.get(key) {
            return Some(value.clone());
        }
        let derive = self.derivations.get(key)?;
        if let Some(value) = self.computed.lock().get(key) {
            return Some(value.clone());
        }

        // Computed without the lock held so derivations can read other
        // computed keys.
        let value = derive(self);
        let mut computed = self.computed.lock();
        Some(computed.entry(key.clone()).or_insert(value).clone())
    }

    pub fn get_state(&self) -> &State<K, V> {
        &self.state
    }

    pub fn set(&self, key: &K, value: V) -> Result<()> {
        self.store.set(key, value)
    }
}

impl<K: StateKey, V: StateValue> SnapshotRepr<K, V> for LegacySnapshot<K, V> {
    fn capture(state: State<K, V>, context: SnapshotContext<K, V, Self>) -> Self {
        Self {
            state,
            derivations: context.derivations,
            computed: Mutex::new(BTreeMap::new()),
            store: context.owner,
        }
    }

    fn value(&self, key: &K) -> Option<V> {
        self.get(key)
    }

    fn state(&self) -> &State<K, V> {
        &self.state
    }

    fn set(&self, key: &K, value: V) -> Result<()> {
        LegacySnapshot::set(self, key, value)
    }

    fn is_computed(&self, key: &K) -> bool {
        self.derivations.contains_key(key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for LegacySnapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacySnapshot")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::LegacySnapshot;
    use crate::store::{LegacyStore, StoreOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_legacy_snapshot_reads_owned_values() {
        let store = LegacyStore::new([("name", "x".to_string())], StoreOptions::default());
        let snapshot = store.get_state();

        store.set(&"name").unwrap().call("y".to_string()).unwrap();

        assert_eq!(snapshot.get(&"name"), Some("x".to_string()));
        assert_eq!(store.get_state().get(&"name"), Some("y".to_string()));
        assert_eq!(snapshot.get_state().len(), 1);
    }

    #[test]
    fn test_legacy_computed_chain() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let store = LegacyStore::builder([("a", 3)])
            .computed("double", move |s: &LegacySnapshot<&'static str, i32>| {
                r.fetch_add(1, Ordering::SeqCst);
                s.get(&"a").unwrap_or(0) * 2
            })
            .computed("quad", |s: &LegacySnapshot<&'static str, i32>| {
                s.get(&"double").unwrap_or(0) * 2
            })
            .build()
            .unwrap();

        let snapshot = store.get_state();
        assert_eq!(snapshot.get(&"quad"), Some(12));
        assert_eq!(snapshot.get(&"double"), Some(6));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
