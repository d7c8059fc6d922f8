use serde_json::{Map, Value};

use super::block_on;
use crate::database::{
    DataSnapshot, Database, DatabaseError, DatabaseQuery, DatabaseReference, DatabaseResult,
    EventType, ListenerHandle,
};

/// Reads `query` once. Pass `reference.query()` to read a plain location.
pub fn once(query: &DatabaseQuery, event: EventType) -> DatabaseResult<DataSnapshot> {
    block_on(query.once(event))
}

pub fn on<S, E>(
    query: &DatabaseQuery,
    event: EventType,
    on_value: S,
    on_error: E,
) -> DatabaseResult<ListenerHandle>
where
    S: Fn(DataSnapshot) + Send + Sync + 'static,
    E: Fn(DatabaseError) + Send + Sync + 'static,
{
    block_on(query.on(event, on_value, on_error))
}

pub fn off(query: &DatabaseQuery, event: EventType, handle: &ListenerHandle) -> DatabaseResult<()> {
    block_on(query.off(event, handle))
}

pub fn set<V>(reference: &DatabaseReference, value: V) -> DatabaseResult<()>
where
    V: Into<Value>,
{
    block_on(reference.set(value))
}

pub fn set_with_priority<V, P>(
    reference: &DatabaseReference,
    value: V,
    priority: P,
) -> DatabaseResult<()>
where
    V: Into<Value>,
    P: Into<Value>,
{
    block_on(reference.set_with_priority(value, priority))
}

pub fn set_priority<P>(reference: &DatabaseReference, priority: P) -> DatabaseResult<()>
where
    P: Into<Value>,
{
    block_on(reference.set_priority(priority))
}

pub fn update(reference: &DatabaseReference, values: Map<String, Value>) -> DatabaseResult<()> {
    block_on(reference.update(values))
}

pub fn push<V>(reference: &DatabaseReference, value: V) -> DatabaseResult<DatabaseReference>
where
    V: Into<Value>,
{
    block_on(reference.push(value))
}

pub fn remove(reference: &DatabaseReference) -> DatabaseResult<()> {
    block_on(reference.remove())
}

pub fn go_online(database: &Database) -> DatabaseResult<()> {
    block_on(database.go_online())
}

pub fn go_offline(database: &Database) -> DatabaseResult<()> {
    block_on(database.go_offline())
}
