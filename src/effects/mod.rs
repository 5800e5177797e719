//! Effects: functions that take a store and hand it back with behavior attached.
//!
//! Any `FnOnce(T) -> Result<T>` is an [`Effect`] over `T`, so plain functions
//! and closures compose without wrapper types:
//!
//! ```
//! use snapstore::effects::{react, with_logger};
//! use snapstore::{Store, StoreOptions};
//!
//! let store = Store::new([("celsius", 0.0), ("fahrenheit", 32.0)], StoreOptions::default())
//!     .with(with_logger)?
//!     .with(react("celsius", "fahrenheit", |c: &f64| c * 9.0 / 5.0 + 32.0))?;
//!
//! store.set(&"celsius")?.call(100.0)?;
//! assert_eq!(store.get(&"fahrenheit"), Some(212.0));
//! # Ok::<(), snapstore::StoreError>(())
//! ```
//!
//! Effects run left to right. An effect that fails during setup stops the
//! chain and its error reaches the caller.

mod inspector;
mod logger;
mod reaction;

pub use inspector::{
    state_to_json, with_inspector, ChannelConnection, CommandHandler, InspectorCommand,
    InspectorConnection, InspectorMessage,
};
pub use logger::with_logger;
pub use reaction::react;

use crate::error::{Result, StoreError};
use crate::snapshot::SnapshotRepr;
use crate::store::StoreDefinition;
use crate::types::{StateKey, StateValue};
use std::collections::BTreeMap;

/// Behavior installed on a store (or on a set of stores) at construction time.
pub trait Effect<T> {
    fn apply(self, target: T) -> Result<T>;
}

impl<T, F> Effect<T> for F
where
    F: FnOnce(T) -> Result<T>,
{
    fn apply(self, target: T) -> Result<T> {
        self(target)
    }
}

/// Type-erased effect, for building effect lists.
pub type BoxedEffect<T> = Box<dyn FnOnce(T) -> Result<T>>;

/// Chain effects left to right into one effect.
pub fn compose<T>(effects: Vec<BoxedEffect<T>>) -> impl FnOnce(T) -> Result<T> {
    move |target| effects.into_iter().try_fold(target, |target, effect| effect(target))
}

/// Named stores that multi-store effects operate on.
pub struct Stores<K, V, S> {
    stores: BTreeMap<String, StoreDefinition<K, V, S>>,
}

impl<K, V, S> Stores<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    pub fn new() -> Self {
        Self {
            stores: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, alias: impl Into<String>, store: StoreDefinition<K, V, S>) -> Result<()> {
        let alias = alias.into();
        if self.stores.contains_key(&alias) {
            return Err(StoreError::DuplicateAlias(alias));
        }
        self.stores.insert(alias, store);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_store(mut self, alias: impl Into<String>, store: StoreDefinition<K, V, S>) -> Result<Self> {
        self.insert(alias, store)?;
        Ok(self)
    }

    pub fn get(&self, alias: &str) -> Result<&StoreDefinition<K, V, S>> {
        self.stores
            .get(alias)
            .ok_or_else(|| StoreError::UnknownAlias(alias.to_string()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StoreDefinition<K, V, S>)> {
        self.stores.iter().map(|(alias, store)| (alias.as_str(), store))
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Apply a multi-store effect.
    pub fn with<E>(self, effect: E) -> Result<Self>
    where
        E: Effect<Self>,
    {
        effect.apply(self)
    }
}

impl<K, V, S> Default for Stores<K, V, S>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    fn default() -> Self {
        Self::new()
    }
}
