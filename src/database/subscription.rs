use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::database::api::{DatabaseQuery, DatabaseReference};
use crate::database::constants::ONE_SHOT_LISTENER_ID;
use crate::database::error::{internal_error, misuse, DatabaseResult};
use crate::database::event::EventType;

const MAX_ID_ATTEMPTS: usize = 8;

/// Opaque identifier of a listener registered with the bridge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of subscription ids. Ids must stay unique for the lifetime of the
/// process, across every database instance sharing a bridge.
pub trait SubscriptionIdGenerator: Send + Sync {
    fn next_id(&self) -> SubscriptionId;
}

/// Generates random version 4 UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl SubscriptionIdGenerator for RandomIdGenerator {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(Uuid::new_v4().to_string())
    }
}

/// How an `on` bridge call should treat its listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ListenMode {
    Once,
    Subscription(SubscriptionId),
}

impl ListenMode {
    pub(crate) fn to_wire(&self) -> Value {
        match self {
            ListenMode::Once => Value::String(ONE_SHOT_LISTENER_ID.to_string()),
            ListenMode::Subscription(id) => Value::String(id.0.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubscriptionState {
    /// Handed to the bridge, not yet acknowledged.
    Pending,
    Active,
    /// An `off` call is in flight.
    Cancelling,
}

#[derive(Clone, Debug)]
struct SubscriptionEntry {
    path: String,
    event: EventType,
    state: SubscriptionState,
}

/// Tracks every listener a database instance has registered.
pub(crate) struct SubscriptionRegistry {
    generator: Arc<dyn SubscriptionIdGenerator>,
    entries: Mutex<HashMap<SubscriptionId, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new(generator: Arc<dyn SubscriptionIdGenerator>) -> Self {
        Self {
            generator,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a fresh id and records it as pending.
    pub(crate) fn reserve(&self, path: &str, event: EventType) -> DatabaseResult<SubscriptionId> {
        let mut entries = self.entries.lock().unwrap();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.generator.next_id();
            if id.as_str() == ONE_SHOT_LISTENER_ID || entries.contains_key(&id) {
                continue;
            }
            entries.insert(
                id.clone(),
                SubscriptionEntry {
                    path: path.to_string(),
                    event,
                    state: SubscriptionState::Pending,
                },
            );
            return Ok(id);
        }
        Err(internal_error(
            "subscription id generator keeps producing ids that are empty or in use",
        ))
    }

    pub(crate) fn activate(&self, id: &SubscriptionId) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(id) {
            if entry.state == SubscriptionState::Pending {
                entry.state = SubscriptionState::Active;
            }
        }
    }

    pub(crate) fn discard(&self, id: &SubscriptionId) {
        self.entries.lock().unwrap().remove(id);
    }

    /// Marks the listener as cancelling and returns its previous state.
    pub(crate) fn begin_cancel(
        &self,
        id: &SubscriptionId,
        path: &str,
        event: EventType,
    ) -> DatabaseResult<SubscriptionState> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| misuse(format!("listener {id} is unknown or already cancelled")))?;
        if entry.state == SubscriptionState::Cancelling {
            return Err(misuse(format!("listener {id} is already being cancelled")));
        }
        if entry.event != event {
            return Err(misuse(format!(
                "listener {id} was registered for '{}', not '{event}'",
                entry.event
            )));
        }
        if entry.path != path {
            return Err(misuse(format!(
                "listener {id} belongs to {}, not {path}",
                entry.path
            )));
        }
        let previous = entry.state;
        entry.state = SubscriptionState::Cancelling;
        Ok(previous)
    }

    /// Undoes [`begin_cancel`](Self::begin_cancel) after a failed `off`.
    pub(crate) fn restore(&self, id: &SubscriptionId, state: SubscriptionState) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(id) {
            entry.state = state;
        }
    }

    pub(crate) fn accepts_delivery(&self, id: &SubscriptionId) -> bool {
        matches!(
            self.entries.lock().unwrap().get(id).map(|entry| entry.state),
            Some(SubscriptionState::Pending | SubscriptionState::Active)
        )
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Returned by `on`; identifies the listener for a later `off`.
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    id: SubscriptionId,
    event: EventType,
    query: DatabaseQuery,
}

impl ListenerHandle {
    pub(crate) fn new(id: SubscriptionId, event: EventType, query: DatabaseQuery) -> Self {
        Self { id, event, query }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event
    }

    pub fn reference(&self) -> &DatabaseReference {
        self.query.reference()
    }

    pub fn query(&self) -> &DatabaseQuery {
        &self.query
    }

    /// Cancels the listener; equivalent to `off` with the registered event type.
    pub async fn cancel(&self) -> DatabaseResult<()> {
        self.query.off(self.event, self).await
    }
}
