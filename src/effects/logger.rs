//! Change logging effect.

use crate::error::Result;
use crate::snapshot::SnapshotRepr;
use crate::store::StoreDefinition;
use crate::types::{Change, StateKey, StateValue};

/// Log every change record at `info` level.
pub fn with_logger<K, V, S>(store: StoreDefinition<K, V, S>) -> Result<StoreDefinition<K, V, S>>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    store.on_all().subscribe(|change: &Change<K, V>| {
        tracing::info!(
            key = ?change.key,
            previous_value = ?change.previous_value,
            value = ?change.value,
            "State changed"
        );
    });
    Ok(store)
}
