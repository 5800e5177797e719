//! Bridge to an external state inspector.
//!
//! The inspector sees an `init` message with the full state, then one
//! `change` message per set. It can send commands back: jump to a recorded
//! state, reset to the initial state, or commit the current state as the new
//! baseline. Jumps replay each key through the store's setters; changes caused
//! by a replay are not echoed back to the inspector.

use crate::error::{Result, StoreError};
use crate::snapshot::SnapshotRepr;
use crate::store::StoreDefinition;
use crate::types::{Change, State, StateKey, StateValue};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Message sent to the inspector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectorMessage {
    /// Full state; sent on connect, reset and commit.
    Init { state: serde_json::Value },

    /// One applied set. `state` is the store's state when the message is
    /// sent, so it already includes sets made by listeners that ran first.
    Change {
        key: String,
        previous_value: serde_json::Value,
        value: serde_json::Value,
        state: serde_json::Value,
    },
}

/// Command received from the inspector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InspectorCommand {
    /// Replay a previously recorded state.
    JumpToState { state: serde_json::Value },
    /// Replay the state the store had when the inspector was attached.
    Reset,
    /// Re-announce the current state as the inspector's baseline.
    Commit,
}

pub type CommandHandler = Box<dyn Fn(InspectorCommand) + Send + Sync>;

/// Connection to an external inspector.
pub trait InspectorConnection: Send + Sync + 'static {
    /// Deliver a message to the inspector.
    fn send(&self, message: InspectorMessage);

    /// Register the handler for commands coming from the inspector.
    fn subscribe(&self, handler: CommandHandler);
}

/// In-process connection: outbound messages go to a channel, inbound commands
/// are pushed with [`ChannelConnection::deliver`].
pub struct ChannelConnection {
    outbound: Sender<InspectorMessage>,
    handlers: Mutex<Vec<Arc<dyn Fn(InspectorCommand) + Send + Sync>>>,
}

impl ChannelConnection {
    /// Create a connection and the receiving end of its outbound messages.
    pub fn new() -> (Arc<Self>, Receiver<InspectorMessage>) {
        let (outbound, receiver) = unbounded();
        let connection = Arc::new(Self {
            outbound,
            handlers: Mutex::new(Vec::new()),
        });
        (connection, receiver)
    }

    /// Hand a command to every registered handler.
    pub fn deliver(&self, command: InspectorCommand) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(command.clone());
        }
    }

    /// Parse a JSON command (e.g. `{"type":"reset"}`) and deliver it.
    pub fn deliver_json(&self, raw: &str) -> Result<()> {
        let command: InspectorCommand = serde_json::from_str(raw)?;
        self.deliver(command);
        Ok(())
    }
}

impl InspectorConnection for ChannelConnection {
    fn send(&self, message: InspectorMessage) {
        // Best effort: the inspector may have gone away.
        if self.outbound.send(message).is_err() {
            tracing::trace!("Inspector receiver dropped");
        }
    }

    fn subscribe(&self, handler: CommandHandler) {
        self.handlers.lock().push(Arc::from(handler));
    }
}

/// Plain state as a JSON object keyed by each key's `Display` form.
pub fn state_to_json<K, V>(state: &State<K, V>) -> Result<serde_json::Value>
where
    K: StateKey + Display,
    V: Serialize,
{
    let mut object = serde_json::Map::with_capacity(state.len());
    for (key, value) in state.iter() {
        object.insert(key.to_string(), serde_json::to_value(value)?);
    }
    Ok(serde_json::Value::Object(object))
}

fn change_message<K, V>(change: &Change<K, V>, state: &State<K, V>) -> Result<InspectorMessage>
where
    K: StateKey + Display,
    V: Serialize,
{
    Ok(InspectorMessage::Change {
        key: change.key.to_string(),
        previous_value: serde_json::to_value(&change.previous_value)?,
        value: serde_json::to_value(&change.value)?,
        state: state_to_json(state)?,
    })
}

/// Sets the replay flag for its lifetime.
struct Replaying<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> Replaying<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for Replaying<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// Decode a recorded state, skipping keys the store does not have.
fn decode_state<K, V, S>(
    store: &StoreDefinition<K, V, S>,
    recorded: &serde_json::Value,
) -> Result<Vec<(K, V)>>
where
    K: StateKey + Display,
    V: StateValue + DeserializeOwned,
    S: SnapshotRepr<K, V>,
{
    let object = recorded
        .as_object()
        .ok_or_else(|| StoreError::Serialization("inspector state is not an object".to_string()))?;
    let snapshot = store.get_state();

    let mut entries = Vec::with_capacity(object.len());
    for (name, raw) in object {
        let Some(key) = snapshot.state().keys().find(|key| key.to_string() == *name) else {
            tracing::warn!(key = %name, "Skipping unknown key in inspector state");
            continue;
        };
        let value: V = serde_json::from_value(raw.clone())?;
        entries.push((key.clone(), value));
    }
    Ok(entries)
}

fn replay<K, V, S>(store: &StoreDefinition<K, V, S>, entries: Vec<(K, V)>, replaying: &AtomicBool) -> Result<usize>
where
    K: StateKey,
    V: StateValue,
    S: SnapshotRepr<K, V>,
{
    let _replaying = Replaying::enter(replaying);
    let count = entries.len();
    for (key, value) in entries {
        store.set(&key)?.call(value)?;
    }
    tracing::debug!(keys = count, "Replayed inspector state");
    Ok(count)
}

/// Mirror the store to `connection` and apply the commands it sends back.
///
/// Everything a command does is synchronous on the thread that delivers it.
/// Failures while handling a command are logged, not returned.
pub fn with_inspector<K, V, S, C>(
    connection: Arc<C>,
) -> impl FnOnce(StoreDefinition<K, V, S>) -> Result<StoreDefinition<K, V, S>>
where
    K: StateKey + Display,
    V: StateValue + Serialize + DeserializeOwned,
    S: SnapshotRepr<K, V>,
    C: InspectorConnection,
{
    move |store| {
        let initial = store.get_state().state().clone();
        connection.send(InspectorMessage::Init {
            state: state_to_json(&initial)?,
        });

        let replaying = Arc::new(AtomicBool::new(false));

        {
            let connection = Arc::clone(&connection);
            let replaying = Arc::clone(&replaying);
            let weak = store.downgrade();
            store.on_all().subscribe(move |change: &Change<K, V>| {
                if replaying.load(Ordering::SeqCst) {
                    return;
                }
                let Some(store) = weak.upgrade() else {
                    return;
                };
                match change_message(change, store.get_state().state()) {
                    Ok(message) => connection.send(message),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode change for inspector"),
                }
            });
        }

        let weak = store.downgrade();
        let outbound: Weak<C> = Arc::downgrade(&connection);
        connection.subscribe(Box::new(move |command: InspectorCommand| {
            let Some(store) = weak.upgrade() else {
                return;
            };
            tracing::debug!(?command, "Inspector command");

            let result = match command {
                InspectorCommand::JumpToState { state } => decode_state(&store, &state)
                    .and_then(|entries| replay(&store, entries, &replaying))
                    .map(|_| ()),
                InspectorCommand::Reset => {
                    let entries = initial.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    replay(&store, entries, &replaying).and_then(|_| {
                        let state = state_to_json(&initial)?;
                        if let Some(connection) = outbound.upgrade() {
                            connection.send(InspectorMessage::Init { state });
                        }
                        Ok(())
                    })
                }
                InspectorCommand::Commit => state_to_json(store.get_state().state()).map(|state| {
                    if let Some(connection) = outbound.upgrade() {
                        connection.send(InspectorMessage::Init { state });
                    }
                }),
            };

            if let Err(e) = result {
                tracing::warn!(error = %e, "Inspector command failed");
            }
        }));

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LegacyStore, Store, StoreOptions};
    use serde_json::json;

    fn drain(receiver: &Receiver<InspectorMessage>) -> Vec<InspectorMessage> {
        receiver.try_iter().collect()
    }

    #[test]
    fn test_init_and_change_messages() {
        let (connection, receiver) = ChannelConnection::new();
        let store = Store::new([("a", 1), ("b", 2)], StoreOptions::default())
            .with(with_inspector(connection))
            .unwrap();

        store.set(&"a").unwrap().call(5).unwrap();

        let messages = drain(&receiver);
        assert_eq!(
            messages,
            vec![
                InspectorMessage::Init {
                    state: json!({"a": 1, "b": 2})
                },
                InspectorMessage::Change {
                    key: "a".to_string(),
                    previous_value: json!(1),
                    value: json!(5),
                    state: json!({"a": 5, "b": 2}),
                },
            ]
        );
    }

    #[test]
    fn test_change_state_includes_earlier_listener_sets() {
        let (connection, receiver) = ChannelConnection::new();
        let store = Store::new([("a", 1), ("b", 2)], StoreOptions::default())
            .with(crate::effects::react("a", "b", |a: &i32| a * 10))
            .unwrap()
            .with(with_inspector(connection))
            .unwrap();
        drain(&receiver);

        store.set(&"a").unwrap().call(5).unwrap();

        // The reaction's change is delivered first; both carry the final state.
        assert_eq!(
            drain(&receiver),
            vec![
                InspectorMessage::Change {
                    key: "b".to_string(),
                    previous_value: json!(2),
                    value: json!(50),
                    state: json!({"a": 5, "b": 50}),
                },
                InspectorMessage::Change {
                    key: "a".to_string(),
                    previous_value: json!(1),
                    value: json!(5),
                    state: json!({"a": 5, "b": 50}),
                },
            ]
        );
    }

    #[test]
    fn test_jump_replays_known_keys_without_echo() {
        let (connection, receiver) = ChannelConnection::new();
        let store = Store::new([("a", 1), ("b", 2)], StoreOptions::default())
            .with(with_inspector(Arc::clone(&connection)))
            .unwrap();
        drain(&receiver);

        connection.deliver(InspectorCommand::JumpToState {
            state: json!({"a": 10, "b": 20, "ghost": 99}),
        });

        assert_eq!(store.get(&"a"), Some(10));
        assert_eq!(store.get(&"b"), Some(20));
        assert!(!store.get_state().state().contains_key(&"ghost"));
        assert!(drain(&receiver).is_empty());

        // Mirroring resumes after the replay.
        store.set(&"a").unwrap().call(11).unwrap();
        assert_eq!(drain(&receiver).len(), 1);
    }

    #[test]
    fn test_bad_value_leaves_state_untouched() {
        let (connection, _receiver) = ChannelConnection::new();
        let store = Store::new([("a", 1), ("b", 2)], StoreOptions::default())
            .with(with_inspector(Arc::clone(&connection)))
            .unwrap();

        connection.deliver(InspectorCommand::JumpToState {
            state: json!({"a": 10, "b": "not a number"}),
        });

        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(store.get(&"b"), Some(2));
    }

    #[test]
    fn test_reset_and_commit() {
        let (connection, receiver) = ChannelConnection::new();
        let store = LegacyStore::new([("a", 1)], StoreOptions::default())
            .with(with_inspector(Arc::clone(&connection)))
            .unwrap();

        store.set(&"a").unwrap().call(7).unwrap();
        drain(&receiver);

        connection.deliver_json(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(
            drain(&receiver),
            vec![InspectorMessage::Init { state: json!({"a": 1}) }]
        );

        store.set(&"a").unwrap().call(3).unwrap();
        drain(&receiver);
        connection.deliver(InspectorCommand::Commit);
        assert_eq!(
            drain(&receiver),
            vec![InspectorMessage::Init { state: json!({"a": 3}) }]
        );
    }

    #[test]
    fn test_deliver_json_rejects_garbage() {
        let (connection, _receiver) = ChannelConnection::new();
        assert!(matches!(
            connection.deliver_json("{\"type\":\"explode\"}"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_message_wire_shape() {
        let message = InspectorMessage::Init { state: json!({"a": 1}) };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"type": "init", "state": {"a": 1}})
        );
    }
}
