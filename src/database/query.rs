use serde_json::{json, Map, Value};

use crate::database::error::{internal_error, DatabaseResult};

/// How the engine orders the children of the queried location.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum OrderStrategy {
    /// Server-default ordering.
    #[default]
    None,
    Child(String),
    Key,
    Priority,
    Value,
}

/// One entry of the range constraint sequence. `key` disambiguates
/// siblings sharing the same ordering value.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeConstraint {
    StartAt { value: Value, key: Option<String> },
    EndAt { value: Value, key: Option<String> },
    EqualTo { value: Value, key: Option<String> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryLimit {
    First(u32),
    Last(u32),
}

/// Accumulated builder state of a query.
///
/// Every `with_*` method returns a fresh value and leaves `self` untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    order: OrderStrategy,
    constraints: Vec<RangeConstraint>,
    limit: Option<QueryLimit>,
}

impl QueryParams {
    pub fn order(&self) -> &OrderStrategy {
        &self.order
    }

    pub fn constraints(&self) -> &[RangeConstraint] {
        &self.constraints
    }

    pub fn limit(&self) -> Option<QueryLimit> {
        self.limit
    }

    pub fn is_default(&self) -> bool {
        self.order == OrderStrategy::None && self.constraints.is_empty() && self.limit.is_none()
    }

    pub(crate) fn with_order(&self, order: OrderStrategy) -> Self {
        Self {
            order,
            ..self.clone()
        }
    }

    pub(crate) fn with_constraint(&self, constraint: RangeConstraint) -> Self {
        let mut next = self.clone();
        next.constraints.push(constraint);
        next
    }

    pub(crate) fn with_limit(&self, limit: QueryLimit) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    /// Encodes the ordering argument of the `on` bridge call.
    pub(crate) fn order_to_wire(&self) -> Value {
        match &self.order {
            OrderStrategy::None => Value::Null,
            OrderStrategy::Child(path) => json!({ "child": path }),
            OrderStrategy::Key => json!({ "key": true }),
            OrderStrategy::Priority => json!({ "priority": true }),
            OrderStrategy::Value => json!({ "value": true }),
        }
    }

    /// Encodes the range constraints verbatim, in call order.
    pub(crate) fn constraints_to_wire(&self) -> Value {
        Value::Array(self.constraints.iter().map(encode_constraint).collect())
    }

    pub(crate) fn limit_to_wire(&self) -> Value {
        match self.limit {
            None => json!({}),
            Some(QueryLimit::First(count)) => json!({ "first": count }),
            Some(QueryLimit::Last(count)) => json!({ "last": count }),
        }
    }

    /// Rebuilds builder state from the three wire arguments of an `on` call.
    pub(crate) fn from_wire(order: &Value, constraints: &Value, limit: &Value) -> DatabaseResult<Self> {
        Ok(Self {
            order: decode_order(order)?,
            constraints: decode_constraints(constraints)?,
            limit: decode_limit(limit)?,
        })
    }
}

fn encode_constraint(constraint: &RangeConstraint) -> Value {
    let (tag, value, key) = match constraint {
        RangeConstraint::StartAt { value, key } => ("startAt", value, key),
        RangeConstraint::EndAt { value, key } => ("endAt", value, key),
        RangeConstraint::EqualTo { value, key } => ("equalTo", value, key),
    };
    let mut entry = Map::with_capacity(2);
    entry.insert(tag.to_string(), value.clone());
    if let Some(key) = key {
        entry.insert("key".to_string(), Value::String(key.clone()));
    }
    Value::Object(entry)
}

fn decode_order(value: &Value) -> DatabaseResult<OrderStrategy> {
    let map = match value {
        Value::Null => return Ok(OrderStrategy::None),
        Value::Object(map) => map,
        other => return Err(internal_error(format!("malformed order argument: {other}"))),
    };
    if let Some(path) = map.get("child") {
        let path = path
            .as_str()
            .ok_or_else(|| internal_error("order by child expects a string path"))?;
        return Ok(OrderStrategy::Child(path.to_string()));
    }
    let flagged = |name: &str| map.get(name).and_then(Value::as_bool).unwrap_or(false);
    if flagged("key") {
        Ok(OrderStrategy::Key)
    } else if flagged("priority") {
        Ok(OrderStrategy::Priority)
    } else if flagged("value") {
        Ok(OrderStrategy::Value)
    } else {
        Ok(OrderStrategy::None)
    }
}

fn decode_constraints(value: &Value) -> DatabaseResult<Vec<RangeConstraint>> {
    let entries = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(entries) => entries,
        other => {
            return Err(internal_error(format!(
                "malformed range constraints argument: {other}"
            )))
        }
    };

    let mut constraints = Vec::with_capacity(entries.len());
    for entry in entries {
        let map = entry
            .as_object()
            .ok_or_else(|| internal_error("range constraint must be an object"))?;
        let key = map.get("key").and_then(Value::as_str).map(str::to_string);
        let constraint = if let Some(value) = map.get("startAt") {
            RangeConstraint::StartAt {
                value: value.clone(),
                key,
            }
        } else if let Some(value) = map.get("endAt") {
            RangeConstraint::EndAt {
                value: value.clone(),
                key,
            }
        } else if let Some(value) = map.get("equalTo") {
            RangeConstraint::EqualTo {
                value: value.clone(),
                key,
            }
        } else {
            return Err(internal_error(format!("unknown range constraint: {entry}")));
        };
        constraints.push(constraint);
    }
    Ok(constraints)
}

fn decode_limit(value: &Value) -> DatabaseResult<Option<QueryLimit>> {
    let Some(map) = value.as_object() else {
        return Ok(None);
    };
    let count = |name: &str| -> DatabaseResult<Option<u32>> {
        match map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => raw
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| internal_error(format!("malformed {name} limit: {raw}"))),
        }
    };
    if let Some(first) = count("first")? {
        return Ok(Some(QueryLimit::First(first)));
    }
    Ok(count("last")?.map(QueryLimit::Last))
}
