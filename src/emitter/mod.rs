//! Typed publish/subscribe with cycle detection.
//!
//! An [`Emitter`] dispatches a payload to listeners registered for a key and
//! to listeners registered for every key:
//!
//! - per-key listeners fire before all-listeners
//! - listeners fire in subscription order
//! - in dev mode, a re-entrant emit of an in-flight key is reported instead of
//!   dispatched
//!
//! # Example
//!
//! ```
//! use snapstore::Emitter;
//!
//! let emitter: Emitter<&str, i32> = Emitter::new();
//! let sub = emitter.on("count").subscribe(|n| println!("count = {}", n));
//! emitter.emit(&"count", &1).unwrap();
//! sub.unsubscribe();
//! ```

#[allow(clippy::module_inception)]
mod emitter;
mod types;

pub use emitter::{Emitter, Observable};
pub use types::{default_cycle_reporter, CycleReporter, EmitterConfig, Subscription, Topic};
