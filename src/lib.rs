//! # Snapstore
//!
//! A keyed state container with frozen snapshots, per-key subscriptions and
//! cycle detection, meant to sit underneath a component-based UI layer.
//!
//! ## Core Concepts
//!
//! - **Emitter**: Publish/subscribe keyed by message name, with an
//!   "all messages" stream and re-entrancy tracking
//! - **Snapshot**: Immutable view of the state at one point in time
//! - **Store**: Owns the current snapshot; `set` swaps in a new snapshot and
//!   notifies per-key listeners, then change-record listeners
//! - **Effects**: `Store -> Store` functions that attach logging, inspector
//!   mirroring or reactions
//!
//! ## Example
//!
//! ```
//! use snapstore::{Change, Store, StoreOptions};
//!
//! let store = Store::new([("a", 1), ("b", 2)], StoreOptions::dev());
//!
//! store.on("a").subscribe(|a| println!("a is now {}", a));
//! store.on_all().subscribe(|change: &Change<&'static str, i32>| {
//!     println!("{:?}: {} -> {}", change.key, change.previous_value, change.value);
//! });
//!
//! let before = store.get_state();
//! store.set(&"a")?.call(5)?;
//!
//! assert_eq!(store.get(&"a"), Some(5));
//! assert_eq!(before.get(&"a"), Some(&1));
//! # Ok::<(), snapstore::StoreError>(())
//! ```

pub mod effects;
pub mod emitter;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-exports
pub use effects::{compose, BoxedEffect, Effect, Stores};
pub use emitter::{CycleReporter, Emitter, EmitterConfig, Observable, Subscription, Topic};
pub use error::{CyclicDependency, Result, StoreError};
pub use snapshot::{LegacySnapshot, Snapshot, SnapshotRepr};
pub use store::{
    LegacyStore, Setter, Store, StoreBuilder, StoreDefinition, StoreOptions, WeakStore,
    DEV_MODE_ENV,
};
pub use types::{Change, ListenerId, State, StateKey, StateValue};
