//! Immutable point-in-time views of store state.
//!
//! A store replaces its snapshot on every `set`; a snapshot never changes
//! after capture. Two representations share the [`SnapshotRepr`] contract:
//!
//! - [`Snapshot`]: frozen state with a per-snapshot side table of computed
//!   values, reads hand out references
//! - [`LegacySnapshot`]: class-style accessor returning owned values, computed
//!   values memoized behind a lock

mod frozen;
mod legacy;

pub use frozen::Snapshot;
pub use legacy::LegacySnapshot;

use crate::error::Result;
use crate::store::WeakStore;
use crate::types::{State, StateKey, StateValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Function computing a derived key from a snapshot.
pub type Derive<V, S> = Arc<dyn Fn(&S) -> V + Send + Sync>;

/// Derived keys of a store and how to compute them.
pub type Derivations<K, V, S> = BTreeMap<K, Derive<V, S>>;

/// What a snapshot needs from its store at capture time.
pub struct SnapshotContext<K, V, S> {
    pub(crate) derivations: Arc<Derivations<K, V, S>>,
    pub(crate) owner: WeakStore<K, V, S>,
}

impl<K, V, S> Clone for SnapshotContext<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            derivations: Arc::clone(&self.derivations),
            owner: self.owner.clone(),
        }
    }
}

/// Snapshot representation used by a store.
pub trait SnapshotRepr<K: StateKey, V: StateValue>: Sized + Send + Sync + 'static {
    /// Freeze `state` into a snapshot owned by the store in `context`.
    fn capture(state: State<K, V>, context: SnapshotContext<K, V, Self>) -> Self;

    /// Value of a plain or computed key.
    fn value(&self, key: &K) -> Option<V>;

    /// The plain state backing this snapshot.
    fn state(&self) -> &State<K, V>;

    /// Write through to the owning store. The snapshot itself is unchanged.
    fn set(&self, key: &K, value: V) -> Result<()>;

    fn is_computed(&self, key: &K) -> bool;
}
