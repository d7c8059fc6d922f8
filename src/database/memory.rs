//! Local engine speaking the same operations as the native plugin.
//!
//! Useful for tests and for running application code without a device. Each
//! store URL owns an independent tree. Only `value` listeners are supported.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::database::api::normalize_path;
use crate::database::bridge::{Bridge, BridgeCall, DeliverySink, Operation};
use crate::database::error::{bridge_error, internal_error, DatabaseResult};
use crate::database::event::EventType;
use crate::database::logger::LOGGER;
use crate::database::push_id::PushIdGenerator;
use crate::database::query::{OrderStrategy, QueryLimit, QueryParams, RangeConstraint};

/// [`Bridge`] backed by in-process trees, one per store URL.
#[derive(Default)]
pub struct InMemoryBridge {
    state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
    stores: HashMap<String, Store>,
    listeners: HashMap<String, Registration>,
    push_ids: PushIdGenerator,
    /// Payloads waiting for their sink, in write order.
    outbox: VecDeque<(DeliverySink, Value)>,
    draining: bool,
}

struct Store {
    root: Node,
    online: bool,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            root: Node::default(),
            online: true,
        }
    }
}

struct Registration {
    url: String,
    path: Vec<String>,
    params: QueryParams,
    sink: DeliverySink,
}

/// A tree node: either a leaf value or a set of children, plus an optional
/// ordering priority.
#[derive(Clone, Debug, Default, PartialEq)]
struct Node {
    leaf: Option<Value>,
    children: BTreeMap<String, Node>,
    priority: Option<Value>,
}

impl InMemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value stored at `path` of the store `url`, `None` when empty.
    pub fn value_at(&self, url: &str, path: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .stores
            .get(url)
            .and_then(|store| store.root.get(&normalize_path(path)))
            .and_then(Node::to_json)
    }

    pub fn priority_at(&self, url: &str, path: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .stores
            .get(url)
            .and_then(|store| store.root.get(&normalize_path(path)))
            .and_then(|node| node.priority.clone())
    }

    /// Connectivity last requested for `url`; stores start online.
    pub fn is_online(&self, url: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.stores.get(url).map_or(true, |store| store.online)
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    fn dispatch(&self, call: &BridgeCall) -> DatabaseResult<Value> {
        let url = call.str_arg(0).to_string();
        match call.operation {
            Operation::On => {
                let (path, params) = decode_listen(call)?;
                let state = self.state.lock().unwrap();
                Ok(state.payload(&url, &path, &params))
            }
            Operation::Off => {
                let id = call.str_arg(2);
                self.state.lock().unwrap().listeners.remove(id);
                Ok(Value::Null)
            }
            Operation::Set => {
                let path = normalize_path(call.str_arg(1));
                let value = call.arg(2).clone();
                let priority = call.arg(3).clone();
                self.mutate(&url, &path, |root| root.write(&path, value, priority));
                Ok(Value::Null)
            }
            Operation::Update => {
                let path = normalize_path(call.str_arg(1));
                let Value::Object(values) = call.arg(2).clone() else {
                    return Err(bridge_error("update expects an object of child values"));
                };
                self.mutate(&url, &path, |root| {
                    for (relative, value) in values {
                        let mut target = path.clone();
                        target.extend(normalize_path(&relative));
                        root.write(&target, value, Value::Null);
                    }
                });
                Ok(Value::Null)
            }
            Operation::Push => {
                let parent = normalize_path(call.str_arg(1));
                let key = {
                    let now = current_time_millis()?;
                    self.state.lock().unwrap().push_ids.next_id(now)
                };
                let mut path = parent;
                path.push(key.clone());
                let value = call.arg(2).clone();
                if !value.is_null() {
                    self.mutate(&url, &path, |root| root.write(&path, value, Value::Null));
                }
                Ok(json!({ "path": format!("/{}", path.join("/")), "key": key }))
            }
            Operation::SetOnline => {
                let online = call
                    .arg(1)
                    .as_bool()
                    .ok_or_else(|| bridge_error("setOnline expects a boolean"))?;
                let mut state = self.state.lock().unwrap();
                state.stores.entry(url).or_default().online = online;
                Ok(Value::Null)
            }
        }
    }

    /// Applies a write, then queues a fresh payload for every listener
    /// watching a related path.
    fn mutate<F>(&self, url: &str, path: &[String], apply: F)
    where
        F: FnOnce(&mut Node),
    {
        {
            let mut state = self.state.lock().unwrap();
            apply(&mut state.stores.entry(url.to_string()).or_default().root);
            let deliveries: Vec<(DeliverySink, Value)> = state
                .listeners
                .values()
                .filter(|listener| listener.url == url && paths_related(&listener.path, path))
                .map(|listener| {
                    let payload = state.payload(url, &listener.path, &listener.params);
                    (listener.sink.clone(), payload)
                })
                .collect();
            state.outbox.extend(deliveries);
        }
        self.drain_outbox();
    }

    /// Hands queued payloads to their sinks in FIFO order, one thread at a
    /// time and without holding the state lock. A caller that finds another
    /// thread draining leaves its payloads to that thread.
    fn drain_outbox(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        loop {
            let (sink, payload) = {
                let mut state = self.state.lock().unwrap();
                match state.outbox.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            sink(Ok(payload));
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Bridge for InMemoryBridge {
    async fn invoke(&self, call: BridgeCall) -> DatabaseResult<Value> {
        self.dispatch(&call)
    }

    async fn listen(&self, call: BridgeCall, sink: DeliverySink) -> DatabaseResult<()> {
        if call.operation != Operation::On {
            return Err(bridge_error(format!(
                "'{}' cannot register a listener",
                call.operation
            )));
        }
        let id = call.str_arg(6).to_string();
        if id.is_empty() {
            return Err(bridge_error("listen requires a subscription id"));
        }
        let (path, params) = decode_listen(&call)?;
        let url = call.str_arg(0).to_string();

        {
            let mut state = self.state.lock().unwrap();
            if state.listeners.contains_key(&id) {
                return Err(bridge_error(format!("subscription id {id} is already in use")));
            }
            let initial = state.payload(&url, &path, &params);
            state.outbox.push_back((sink.clone(), initial));
            state.listeners.insert(
                id.clone(),
                Registration {
                    url,
                    path,
                    params,
                    sink,
                },
            );
        }
        LOGGER.debug(format!("in-memory engine registered listener {id}"));
        self.drain_outbox();
        Ok(())
    }
}

impl EngineState {
    fn payload(&self, url: &str, path: &[String], params: &QueryParams) -> Value {
        let node = self
            .stores
            .get(url)
            .and_then(|store| store.root.get(path))
            .filter(|node| !node.is_empty());
        build_payload(path.last().map(String::as_str), node, params)
    }
}

fn decode_listen(call: &BridgeCall) -> DatabaseResult<(Vec<String>, QueryParams)> {
    let event: EventType = call.str_arg(2).parse().map_err(|_| {
        bridge_error(format!("unknown event type '{}'", call.str_arg(2)))
    })?;
    if event != EventType::Value {
        return Err(bridge_error(format!(
            "event type '{event}' is not supported by the in-memory engine"
        )));
    }
    let params = QueryParams::from_wire(call.arg(3), call.arg(4), call.arg(5))
        .map_err(|err| bridge_error(format!("invalid query: {}", err.message())))?;
    Ok((normalize_path(call.str_arg(1)), params))
}

fn build_payload(key: Option<&str>, node: Option<&Node>, params: &QueryParams) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "key".to_string(),
        key.map_or(Value::Null, |key| Value::String(key.to_string())),
    );
    let Some(node) = node else {
        return Value::Object(payload);
    };
    if let Some(priority) = &node.priority {
        payload.insert("priority".to_string(), priority.clone());
    }

    if let Some(leaf) = &node.leaf {
        payload.insert("value".to_string(), leaf.clone());
        return Value::Object(payload);
    }

    let selected = select_children(node, params);
    let mut value = Map::with_capacity(selected.len());
    let mut children = Vec::with_capacity(selected.len());
    for (child_key, child) in selected {
        if let Some(child_value) = child.to_json() {
            value.insert(child_key.clone(), child_value);
        }
        children.push(json!({ "key": child_key }));
    }
    if !value.is_empty() {
        payload.insert("value".to_string(), collapse_array(value));
    }
    payload.insert("children".to_string(), Value::Array(children));
    Value::Object(payload)
}

/// Orders, filters and limits the children of `node` the way the query asks.
fn select_children<'a>(node: &'a Node, params: &QueryParams) -> Vec<(&'a String, &'a Node)> {
    let order = params.order();
    let mut entries: Vec<(&String, &Node)> = node.children.iter().collect();
    entries.sort_by(|(left_key, left), (right_key, right)| {
        compare_indexed(
            order,
            &index_value(order, left_key, left),
            &index_value(order, right_key, right),
        )
        .then_with(|| compare_keys(left_key, right_key))
    });

    for constraint in params.constraints() {
        entries.retain(|(child_key, child)| {
            let indexed = index_value(order, child_key, child);
            let position = |bound: &Value, bound_key: &Option<String>| {
                compare_indexed(order, &indexed, bound).then_with(|| match bound_key {
                    Some(bound_key) => compare_keys(child_key, bound_key),
                    None => Ordering::Equal,
                })
            };
            match constraint {
                RangeConstraint::StartAt { value, key } => position(value, key) != Ordering::Less,
                RangeConstraint::EndAt { value, key } => position(value, key) != Ordering::Greater,
                RangeConstraint::EqualTo { value, key } => position(value, key) == Ordering::Equal,
            }
        });
    }

    match params.limit() {
        Some(QueryLimit::First(count)) => entries.truncate(count as usize),
        Some(QueryLimit::Last(count)) => {
            let skip = entries.len().saturating_sub(count as usize);
            entries = entries.split_off(skip);
        }
        None => {}
    }
    entries
}

fn index_value(order: &OrderStrategy, key: &str, node: &Node) -> Value {
    match order {
        OrderStrategy::None | OrderStrategy::Priority => {
            node.priority.clone().unwrap_or(Value::Null)
        }
        OrderStrategy::Key => Value::String(key.to_string()),
        OrderStrategy::Value => node.to_json().unwrap_or(Value::Null),
        OrderStrategy::Child(path) => node
            .get(&normalize_path(path))
            .and_then(Node::to_json)
            .unwrap_or(Value::Null),
    }
}

fn compare_indexed(order: &OrderStrategy, left: &Value, right: &Value) -> Ordering {
    match (order, left, right) {
        (OrderStrategy::Key, Value::String(left), Value::String(right)) => {
            compare_keys(left, right)
        }
        _ => compare_values(left, right),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// null < false < true < numbers < strings < objects.
fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Integer-like keys first in numeric order, then the rest lexicographically.
fn compare_keys(left: &str, right: &str) -> Ordering {
    match (integer_key(left), integer_key(right)) {
        (Some(a), Some(b)) => a.cmp(&b).then_with(|| left.cmp(right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn integer_key(key: &str) -> Option<i64> {
    key.parse::<i64>()
        .ok()
        .filter(|parsed| parsed.to_string() == key)
}

/// Reads integer-keyed children back as an array when the keys are dense
/// enough (largest index below twice the child count); holes become `null`.
fn collapse_array(map: Map<String, Value>) -> Value {
    let indices: Option<Vec<usize>> = map
        .keys()
        .map(|key| integer_key(key).and_then(|index| usize::try_from(index).ok()))
        .collect();
    let max_index = match indices.as_ref().and_then(|indices| indices.iter().max()) {
        Some(&max_index) if max_index < 2 * map.len() => max_index,
        _ => return Value::Object(map),
    };
    let mut items = vec![Value::Null; max_index + 1];
    for (key, value) in map {
        if let Some(index) = integer_key(&key).and_then(|index| usize::try_from(index).ok()) {
            items[index] = value;
        }
    }
    Value::Array(items)
}

fn paths_related(a: &[String], b: &[String]) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(left, right)| left == right)
}

fn current_time_millis() -> DatabaseResult<u64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| internal_error("System time is before the Unix epoch"))?;
    duration
        .as_millis()
        .try_into()
        .map_err(|_| internal_error("Timestamp exceeds 64-bit range"))
}

impl Node {
    fn from_json(value: Value) -> Node {
        match value {
            Value::Null => Node::default(),
            Value::Object(map) => Node::from_children(map),
            Value::Array(items) => Node::from_children(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item)),
            ),
            leaf => Node {
                leaf: Some(leaf),
                ..Node::default()
            },
        }
    }

    fn from_children(entries: impl IntoIterator<Item = (String, Value)>) -> Node {
        let children = entries
            .into_iter()
            .map(|(key, value)| (key, Node::from_json(value)))
            .filter(|(_, child)| !child.is_empty())
            .collect();
        Node {
            children,
            ..Node::default()
        }
    }

    fn to_json(&self) -> Option<Value> {
        if let Some(leaf) = &self.leaf {
            return Some(leaf.clone());
        }
        if self.children.is_empty() {
            return None;
        }
        let map: Map<String, Value> = self
            .children
            .iter()
            .filter_map(|(key, child)| child.to_json().map(|value| (key.clone(), value)))
            .collect();
        Some(collapse_array(map))
    }

    fn is_empty(&self) -> bool {
        self.leaf.is_none() && self.children.is_empty()
    }

    fn get(&self, path: &[String]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(head)?.get(rest),
        }
    }

    fn get_mut(&mut self, path: &[String]) -> Option<&mut Node> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get_mut(head)?.get_mut(rest),
        }
    }

    /// `set` semantics: both null deletes, a null value with a priority only
    /// touches the priority, a null priority keeps the existing one.
    fn write(&mut self, path: &[String], value: Value, priority: Value) {
        match (value.is_null(), priority.is_null()) {
            (true, true) => self.remove(path),
            (true, false) => {
                if let Some(node) = self.get_mut(path).filter(|node| !node.is_empty()) {
                    node.priority = Some(priority);
                }
            }
            (false, _) => {
                let previous = self.get(path).and_then(|node| node.priority.clone());
                let mut node = Node::from_json(value);
                node.priority = if priority.is_null() {
                    previous
                } else {
                    Some(priority)
                };
                if node.is_empty() {
                    self.remove(path);
                } else {
                    self.replace(path, node);
                }
            }
        }
    }

    fn replace(&mut self, path: &[String], node: Node) {
        match path.split_first() {
            None => *self = node,
            Some((head, rest)) => {
                self.leaf = None;
                self.children
                    .entry(head.clone())
                    .or_default()
                    .replace(rest, node);
            }
        }
    }

    fn remove(&mut self, path: &[String]) {
        match path.split_first() {
            None => *self = Node::default(),
            Some((head, rest)) => {
                if let Some(child) = self.children.get_mut(head) {
                    child.remove(rest);
                    if child.is_empty() {
                        self.children.remove(head);
                    }
                }
            }
        }
    }
}
