use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::api::DatabaseReference;
use crate::database::error::{internal_error, DatabaseResult};

/// Payload shape returned by a read through the bridge.
///
/// A `null` or missing `value` means the node does not exist. When present,
/// `children` lists the keys of `value` in the order the engine chose for the
/// active query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildEntry>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub key: String,
}

impl RawPayload {
    /// Decodes a bridge outcome. A bare `null` outcome is an empty payload.
    pub fn from_value(value: Value) -> DatabaseResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|err| internal_error(format!("malformed snapshot payload: {err}"))),
            other => Err(internal_error(format!(
                "snapshot payload must be an object, got {other}"
            ))),
        }
    }
}

/// Immutable view over one payload delivered for a location.
#[derive(Clone, Debug)]
pub struct DataSnapshot {
    reference: DatabaseReference,
    payload: Arc<RawPayload>,
}

impl DataSnapshot {
    pub(crate) fn new(reference: DatabaseReference, payload: RawPayload) -> Self {
        Self {
            reference,
            payload: Arc::new(payload),
        }
    }

    pub(crate) fn from_outcome(reference: DatabaseReference, outcome: Value) -> DatabaseResult<Self> {
        Ok(Self::new(reference, RawPayload::from_value(outcome)?))
    }

    pub fn reference(&self) -> &DatabaseReference {
        &self.reference
    }

    /// Key reported by the engine, falling back to the last segment of the
    /// queried location.
    pub fn key(&self) -> Option<&str> {
        self.payload
            .key
            .as_deref()
            .or_else(|| self.reference.key())
    }

    /// Returns the value, or `None` when the node holds no data.
    ///
    /// `Some(&json!(0))` and `Some(&json!(false))` are real values and are
    /// never folded into `None`.
    pub fn val(&self) -> Option<&Value> {
        self.payload.value.as_ref()
    }

    /// Deserializes the value into `T`; `Ok(None)` when the node is empty.
    pub fn val_as<T>(&self) -> DatabaseResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.val()
            .map(|value| {
                T::deserialize(value)
                    .map_err(|err| internal_error(format!("failed to decode snapshot value: {err}")))
            })
            .transpose()
    }

    /// True whenever a non-null value is present, so `0`, `false` and `""`
    /// exist. This deliberately differs from the plugin's JavaScript wrapper,
    /// which tests the value for truthiness.
    pub fn exists(&self) -> bool {
        self.payload.value.is_some()
    }

    pub fn priority(&self) -> Option<&Value> {
        self.payload.priority.as_ref()
    }

    /// Iterates children in the order listed by the engine.
    pub fn children(&self) -> impl Iterator<Item = ChildSnapshot<'_>> + '_ {
        self.payload
            .children
            .iter()
            .flatten()
            .map(move |entry| ChildSnapshot {
                key: &entry.key,
                parent: self.payload.value.as_ref(),
            })
    }

    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(ChildSnapshot<'_>),
    {
        for child in self.children() {
            visitor(child);
        }
    }

    pub fn child_count(&self) -> usize {
        self.payload.children.as_ref().map_or(0, Vec::len)
    }

    pub fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    pub fn payload(&self) -> &RawPayload {
        &self.payload
    }

    pub fn into_payload(self) -> RawPayload {
        Arc::try_unwrap(self.payload).unwrap_or_else(|shared| (*shared).clone())
    }
}

/// A child entry of a [`DataSnapshot`]; the value is looked up in the parent
/// only when [`ChildSnapshot::val`] is called.
#[derive(Clone, Copy, Debug)]
pub struct ChildSnapshot<'a> {
    key: &'a str,
    parent: Option<&'a Value>,
}

impl<'a> ChildSnapshot<'a> {
    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn val(&self) -> Option<&'a Value> {
        let child = match self.parent? {
            Value::Object(map) => map.get(self.key),
            Value::Array(items) => self
                .key
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        };
        child.filter(|value| !value.is_null())
    }

    pub fn exists(&self) -> bool {
        self.val().is_some()
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::test_support::RecordingBridge;
    use serde::Deserialize;
    use serde_json::json;

    fn reference(path: &str) -> DatabaseReference {
        Database::new(RecordingBridge::new()).reference(path)
    }

    fn snapshot(payload: Value) -> DataSnapshot {
        DataSnapshot::from_outcome(reference("scores"), payload).unwrap()
    }

    #[test]
    fn value_present_exists() {
        let snap = snapshot(json!({ "key": "scores", "value": 42 }));
        assert_eq!(snap.val(), Some(&json!(42)));
        assert!(snap.exists());
        assert_eq!(snap.key(), Some("scores"));
    }

    #[test]
    fn missing_value_is_absent() {
        let snap = snapshot(json!({ "key": "scores" }));
        assert_eq!(snap.val(), None);
        assert!(!snap.exists());
        assert_eq!(snap.priority(), None);
        assert_eq!(snap.children().count(), 0);
    }

    #[test]
    fn falsy_values_still_exist() {
        for value in [json!(0), json!(false), json!("")] {
            let snap = snapshot(json!({ "value": value.clone() }));
            assert_eq!(snap.val(), Some(&value));
            assert!(snap.exists());
        }
        assert!(!snapshot(json!({ "value": null })).exists());
    }

    #[test]
    fn for_each_follows_child_list_order() {
        let snap = snapshot(json!({
            "key": "scores",
            "value": { "a": 1, "b": 2, "c": 3 },
            "priority": 7,
            "children": [{ "key": "c" }, { "key": "a" }, { "key": "b" }]
        }));

        let mut visited = Vec::new();
        snap.for_each(|child| visited.push((child.key().to_string(), child.val().cloned())));

        assert_eq!(
            visited,
            vec![
                ("c".to_string(), Some(json!(3))),
                ("a".to_string(), Some(json!(1))),
                ("b".to_string(), Some(json!(2))),
            ]
        );
        assert_eq!(snap.priority(), Some(&json!(7)));
        assert_eq!(snap.child_count(), 3);
    }

    #[test]
    fn child_missing_from_value_reads_as_absent() {
        let snap = snapshot(json!({
            "value": { "a": 1 },
            "children": [{ "key": "a" }, { "key": "ghost" }]
        }));
        let children: Vec<_> = snap.children().collect();
        assert!(children[0].exists());
        assert_eq!(children[1].val(), None);
    }

    #[test]
    fn array_values_are_indexed_by_key() {
        let snap = snapshot(json!({
            "value": ["x", "y"],
            "children": [{ "key": "1" }, { "key": "0" }]
        }));
        let values: Vec<_> = snap.children().filter_map(|c| c.val().cloned()).collect();
        assert_eq!(values, vec![json!("y"), json!("x")]);
    }

    #[test]
    fn null_outcome_is_empty_payload() {
        let snap = snapshot(Value::Null);
        assert!(!snap.exists());
        assert_eq!(snap.key(), Some("scores"));
    }

    #[test]
    fn non_object_outcome_is_rejected() {
        let err = DataSnapshot::from_outcome(reference("x"), json!([1, 2])).unwrap_err();
        assert_eq!(err.code_str(), "database/internal");
    }

    #[test]
    fn val_as_decodes_typed_values() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Player {
            name: String,
            score: u32,
        }

        let snap = snapshot(json!({ "value": { "name": "ada", "score": 9 } }));
        let player: Option<Player> = snap.val_as().unwrap();
        assert_eq!(
            player,
            Some(Player {
                name: "ada".into(),
                score: 9
            })
        );
        assert_eq!(snapshot(json!({})).val_as::<Player>().unwrap(), None);
    }
}
