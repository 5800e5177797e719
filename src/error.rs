//! Error types for the state container.

use std::fmt;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Key is read-only: {0}")]
    ReadOnlyKey(String),

    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    #[error("Cyclic dependency detected: {0}")]
    CyclicDependency(CyclicDependency),

    #[error("Store was dropped")]
    StoreDropped,

    #[error("Store alias already exists: {0}")]
    DuplicateAlias(String),

    #[error("Store alias not found: {0}")]
    UnknownAlias(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Effect failed: {0}")]
    Effect(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Diagnostic produced when an emit re-enters a key that is still in flight.
///
/// `chain` holds the in-flight keys in call order followed by the repeated key,
/// so `a -> b -> a` means `a` emitted, its listeners emitted `b`, and `b`'s
/// listeners tried to emit `a` again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CyclicDependency {
    pub chain: Vec<String>,
}

impl CyclicDependency {
    /// The key whose re-entry was suppressed.
    pub fn repeated_key(&self) -> Option<&str> {
        self.chain.last().map(String::as_str)
    }
}

impl fmt::Display for CyclicDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chain.join(" -> "))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let cycle = CyclicDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.to_string(), "a -> b -> a");
        assert_eq!(cycle.repeated_key(), Some("a"));

        let err = StoreError::CyclicDependency(cycle);
        assert_eq!(err.to_string(), "Cyclic dependency detected: a -> b -> a");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: StoreError = parse.unwrap_err().into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
