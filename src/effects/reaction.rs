//! Reactions: derive one key from another on every change.

use crate::error::{Result, StoreError};
use crate::snapshot::SnapshotRepr;
use crate::store::StoreDefinition;
use crate::types::{StateKey, StateValue};

/// Whenever `source` changes, set `target` to `map(new value)`.
///
/// Both keys are checked when the effect is applied. In dev mode a reaction
/// that feeds back into its own source is cut off by cycle detection.
pub fn react<K, V, S, F>(
    source: K,
    target: K,
    map: F,
) -> impl FnOnce(StoreDefinition<K, V, S>) -> Result<StoreDefinition<K, V, S>>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
    F: Fn(&V) -> V + Send + Sync + 'static,
{
    move |store| {
        if !store.get_state().state().contains_key(&source) {
            return Err(StoreError::UnknownKey(format!("{:?}", source)));
        }
        let setter = store.set(&target)?;

        store.on(source).subscribe(move |value| {
            if let Err(e) = setter.call(map(value)) {
                tracing::debug!(target_key = ?setter.key(), error = %e, "Reaction skipped");
            }
        });
        Ok(store)
    }
}
