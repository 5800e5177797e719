//! Frozen snapshots with per-snapshot memoized computed keys.

use crate::error::Result;
use crate::store::WeakStore;
use crate::types::{State, StateKey, StateValue};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::{Derivations, SnapshotContext, SnapshotRepr};

/// Frozen view of a store's state.
///
/// Computed keys are evaluated on first read and cached for the lifetime of
/// this snapshot. A derivation must not read its own key.
pub struct Snapshot<K, V> {
    state: State<K, V>,
    derivations: Arc<Derivations<K, V, Self>>,
    memo: BTreeMap<K, OnceLock<V>>,
    owner: WeakStore<K, V, Self>,
}

impl<K: StateKey, V: StateValue> Snapshot<K, V> {
    /// Value for `key` as of capture.
    pub fn get(&self, key: &K) -> Option<&V> {
        if let Some(value) = self.state.get(key) {
            return Some(value);
        }
        let cell = self.memo.get(key)?;
        let derive = self.derivations.get(key)?;
        Some(cell.get_or_init(|| derive(self)))
    }

    pub fn state(&self) -> &State<K, V> {
        &self.state
    }

    /// Route a write to the owning store.
    pub fn set(&self, key: &K, value: V) -> Result<()> {
        self.owner.set(key, value)
    }
}

impl<K: StateKey, V: StateValue> SnapshotRepr<K, V> for Snapshot<K, V> {
    fn capture(state: State<K, V>, context: SnapshotContext<K, V, Self>) -> Self {
        let memo = context
            .derivations
            .keys()
            .map(|key| (key.clone(), OnceLock::new()))
            .collect();
        Self {
            state,
            derivations: context.derivations,
            memo,
            owner: context.owner,
        }
    }

    fn value(&self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn state(&self) -> &State<K, V> {
        &self.state
    }

    fn set(&self, key: &K, value: V) -> Result<()> {
        Snapshot::set(self, key, value)
    }

    fn is_computed(&self, key: &K) -> bool {
        self.derivations.contains_key(key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Snapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("state", &self.state)
            .field("computed", &self.memo.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::store::{Store, StoreOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_snapshot_is_frozen_across_sets() {
        let store = Store::new([("a", 1), ("b", 2)], StoreOptions::default());
        let before = store.get_state();

        store.set(&"a").unwrap().call(5).unwrap();

        assert_eq!(before.get(&"a"), Some(&1));
        assert_eq!(store.get_state().get(&"a"), Some(&5));
        assert_eq!(store.get_state().get(&"b"), Some(&2));
    }

    #[test]
    fn test_set_through_snapshot_routes_to_store() {
        let store = Store::new([("a", 1)], StoreOptions::default());
        let snapshot = store.get_state();

        snapshot.set(&"a", 7).unwrap();

        assert_eq!(snapshot.get(&"a"), Some(&1));
        assert_eq!(store.get(&"a"), Some(7));
    }

    #[test]
    fn test_set_through_orphaned_snapshot() {
        let snapshot = {
            let store = Store::new([("a", 1)], StoreOptions::default());
            store.get_state()
        };
        assert!(matches!(snapshot.set(&"a", 2), Err(StoreError::StoreDropped)));
        assert_eq!(snapshot.get(&"a"), Some(&1));
    }

    #[test]
    fn test_computed_key_memoized_per_snapshot() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let store = Store::builder([("a", 2), ("b", 3)])
            .computed("sum", move |s: &super::Snapshot<&'static str, i32>| {
                r.fetch_add(1, Ordering::SeqCst);
                s.get(&"a").copied().unwrap_or(0) + s.get(&"b").copied().unwrap_or(0)
            })
            .build()
            .unwrap();

        let first = store.get_state();
        assert_eq!(first.get(&"sum"), Some(&5));
        assert_eq!(first.get(&"sum"), Some(&5));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set(&"a").unwrap().call(10).unwrap();
        let second = store.get_state();
        assert_eq!(second.get(&"sum"), Some(&13));
        assert_eq!(first.get(&"sum"), Some(&5));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_computed_key_absent_from_state() {
        let store = Store::builder([("a", 2)])
            .computed("double", |s: &super::Snapshot<&'static str, i32>| {
                s.get(&"a").copied().unwrap_or(0) * 2
            })
            .build()
            .unwrap();

        let snapshot = store.get_state();
        assert!(!snapshot.state().contains_key(&"double"));
        assert_eq!(snapshot.get(&"double"), Some(&4));
        assert_eq!(snapshot.get(&"missing"), None);
    }
}
