//! Emitter types: topics, subscriptions and cycle reporting.

use crate::error::CyclicDependency;
use crate::types::ListenerId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Callback invoked when a cyclic emit is suppressed.
pub type CycleReporter = Arc<dyn Fn(&CyclicDependency) + Send + Sync>;

/// Reporter used when none is configured.
pub fn default_cycle_reporter() -> CycleReporter {
    Arc::new(|cycle: &CyclicDependency| {
        tracing::warn!(
            chain = %cycle,
            "Cyclic dependency detected; nested emit skipped"
        );
    })
}

/// What a listener is registered for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Topic<K> {
    /// Emissions of one key.
    Key(K),
    /// Emissions of every key.
    All,
}

/// Configuration for an emitter.
#[derive(Clone, Default)]
pub struct EmitterConfig {
    /// Track in-flight keys and suppress re-entrant emits.
    /// Default: false
    pub dev_mode: bool,

    /// Where cycle diagnostics go (None = `tracing::warn!`).
    pub cycle_reporter: Option<CycleReporter>,
}

impl EmitterConfig {
    pub fn dev() -> Self {
        Self {
            dev_mode: true,
            ..Default::default()
        }
    }

    pub fn with_cycle_reporter(mut self, reporter: CycleReporter) -> Self {
        self.cycle_reporter = Some(reporter);
        self
    }
}

impl fmt::Debug for EmitterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterConfig")
            .field("dev_mode", &self.dev_mode)
            .field("cycle_reporter", &self.cycle_reporter.is_some())
            .finish()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    id: ListenerId,
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            id,
            release: Mutex::new(Some(release)),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Deregister the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
