//! Core types for the state container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bound for state keys.
///
/// Keys are ordered so that state iteration, inspector output and cycle
/// chains are deterministic.
pub trait StateKey: Clone + Ord + fmt::Debug + Send + Sync + 'static {}

impl<T> StateKey for T where T: Clone + Ord + fmt::Debug + Send + Sync + 'static {}

/// Bound for state values.
pub trait StateValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> StateValue for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

/// A keyed state object.
///
/// The key set is fixed when a store is created. `State` only hands out
/// shared references; a changed state is always a new value built with
/// [`State::with`].
#[derive(Clone, PartialEq, Eq)]
pub struct State<K, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V> State<K, V> {
    /// Create a state from its entries.
    pub fn new(entries: BTreeMap<K, V>) -> Self {
        Self { entries }
    }

    /// Value stored for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &BTreeMap<K, V> {
        &self.entries
    }
}

impl<K: Ord + Clone, V: Clone> State<K, V> {
    /// A copy of this state with `key` mapped to `value`.
    pub fn with(&self, key: K, value: V) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(key, value);
        Self { entries }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for State<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K: Ord, V> From<BTreeMap<K, V>> for State<K, V> {
    fn from(entries: BTreeMap<K, V>) -> Self {
        Self { entries }
    }
}

impl<K: Ord, V, const N: usize> From<[(K, V); N]> for State<K, V> {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for State<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// One applied `set`, as delivered on the all-changes stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<K, V> {
    pub key: K,
    pub previous_value: V,
    pub value: V,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_with_leaves_original() {
        let state = State::from([("a", 1), ("b", 2)]);
        let next = state.with("a", 5);

        assert_eq!(state.get(&"a"), Some(&1));
        assert_eq!(next.get(&"a"), Some(&5));
        assert_eq!(next.get(&"b"), Some(&2));
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_state_iteration_is_ordered() {
        let state: State<&str, i32> = vec![("c", 3), ("a", 1), ("b", 2)].into_iter().collect();
        let keys: Vec<_> = state.keys().copied().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_state_debug() {
        let state = State::from([("a", 1)]);
        assert_eq!(format!("{:?}", state), "{\"a\": 1}");
    }
}
