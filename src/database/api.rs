use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::database::bridge::{Bridge, BridgeCall, DeliverySink, Operation};
use crate::database::error::{internal_error, DatabaseError, DatabaseResult};
use crate::database::event::EventType;
use crate::database::logger::LOGGER;
use crate::database::options::DatabaseOptions;
use crate::database::query::{OrderStrategy, QueryLimit, QueryParams, RangeConstraint};
use crate::database::snapshot::DataSnapshot;
use crate::database::subscription::{
    ListenMode, ListenerHandle, RandomIdGenerator, SubscriptionIdGenerator, SubscriptionRegistry,
};

/// Entry point bound to one store; hands out references and toggles
/// connectivity for that store.
#[derive(Clone, Debug)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    url: String,
    plugin_name: String,
    bridge: Arc<dyn Bridge>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl fmt::Debug for DatabaseInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseInner")
            .field("url", &self.url)
            .field("plugin_name", &self.plugin_name)
            .field("bridge", &"dynamic")
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

/// Location in the tree, with navigation and write operations.
///
/// Every query modifier is also available here and yields a [`DatabaseQuery`]
/// anchored at this location.
#[derive(Clone, Debug)]
pub struct DatabaseReference {
    database: Database,
    path: Vec<String>,
}

/// Immutable query: a location plus ordering, range constraints and a limit.
///
/// Modifiers borrow `self` and return a new query, so a query can be shared
/// and extended in several directions.
#[derive(Clone, Debug)]
pub struct DatabaseQuery {
    reference: DatabaseReference,
    params: QueryParams,
}

/// Plugins answer `push` either with `{path, key}` or with the bare key.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PushOutcome {
    Located {
        #[serde(default)]
        path: Option<String>,
        key: String,
    },
    Key(String),
}

impl PushOutcome {
    fn into_parts(self) -> (String, Option<String>) {
        match self {
            PushOutcome::Located { path, key } => (key, path),
            PushOutcome::Key(key) => (key, None),
        }
    }
}

impl Database {
    /// Creates a database for the default store.
    pub fn new(bridge: Arc<dyn Bridge>) -> Self {
        Self::from_parts(bridge, DatabaseOptions::default(), Arc::new(RandomIdGenerator))
    }

    pub fn with_options(bridge: Arc<dyn Bridge>, options: DatabaseOptions) -> DatabaseResult<Self> {
        Self::with_id_generator(bridge, options, Arc::new(RandomIdGenerator))
    }

    /// Like [`with_options`](Self::with_options) with a custom source of
    /// subscription ids.
    pub fn with_id_generator(
        bridge: Arc<dyn Bridge>,
        options: DatabaseOptions,
        generator: Arc<dyn SubscriptionIdGenerator>,
    ) -> DatabaseResult<Self> {
        options.validate()?;
        Ok(Self::from_parts(bridge, options, generator))
    }

    fn from_parts(
        bridge: Arc<dyn Bridge>,
        options: DatabaseOptions,
        generator: Arc<dyn SubscriptionIdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                url: options.store_url(),
                plugin_name: options.plugin_name,
                bridge,
                subscriptions: Arc::new(SubscriptionRegistry::new(generator)),
            }),
        }
    }

    /// Store identifier sent with every call; empty for the default store.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn plugin_name(&self) -> &str {
        &self.inner.plugin_name
    }

    pub fn reference(&self, path: &str) -> DatabaseReference {
        self.reference_from_segments(normalize_path(path))
    }

    pub fn root(&self) -> DatabaseReference {
        self.reference_from_segments(Vec::new())
    }

    pub async fn go_online(&self) -> DatabaseResult<()> {
        self.set_online(true).await
    }

    pub async fn go_offline(&self) -> DatabaseResult<()> {
        self.set_online(false).await
    }

    /// Number of listeners registered and not yet cancelled.
    pub fn active_listener_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    async fn set_online(&self, online: bool) -> DatabaseResult<()> {
        let args = vec![Value::String(self.inner.url.clone()), Value::Bool(online)];
        self.invoke(Operation::SetOnline, args).await.map(|_| ())
    }

    fn reference_from_segments(&self, segments: Vec<String>) -> DatabaseReference {
        DatabaseReference {
            database: self.clone(),
            path: segments,
        }
    }

    fn call(&self, operation: Operation, args: Vec<Value>) -> BridgeCall {
        BridgeCall::new(self.inner.plugin_name.clone(), operation, args)
    }

    async fn invoke(&self, operation: Operation, args: Vec<Value>) -> DatabaseResult<Value> {
        let call = self.call(operation, args);
        LOGGER.debug(format!("bridge call '{operation}' {}", call.arg(1)));
        self.inner.bridge.invoke(call).await
    }
}

impl DatabaseReference {
    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn url(&self) -> &str {
        self.database.url()
    }

    /// Last path segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.last().map(|segment| segment.as_str())
    }

    /// Slash-delimited absolute path, `/` at the root.
    pub fn path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    pub fn child(&self, relative: &str) -> DatabaseReference {
        let mut segments = self.path.clone();
        segments.extend(normalize_path(relative));
        self.database.reference_from_segments(segments)
    }

    pub fn parent(&self) -> Option<DatabaseReference> {
        let (_, parent) = self.path.split_last()?;
        Some(self.database.reference_from_segments(parent.to_vec()))
    }

    pub fn root(&self) -> DatabaseReference {
        self.database.root()
    }

    /// Query over this location with no modifiers.
    pub fn query(&self) -> DatabaseQuery {
        DatabaseQuery {
            reference: self.clone(),
            params: QueryParams::default(),
        }
    }

    pub fn order_by_child(&self, path: impl Into<String>) -> DatabaseQuery {
        self.query().order_by_child(path)
    }

    pub fn order_by_key(&self) -> DatabaseQuery {
        self.query().order_by_key()
    }

    pub fn order_by_priority(&self) -> DatabaseQuery {
        self.query().order_by_priority()
    }

    pub fn order_by_value(&self) -> DatabaseQuery {
        self.query().order_by_value()
    }

    pub fn start_at(&self, value: impl Into<Value>) -> DatabaseQuery {
        self.query().start_at(value)
    }

    pub fn start_at_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> DatabaseQuery {
        self.query().start_at_with_key(value, key)
    }

    pub fn end_at(&self, value: impl Into<Value>) -> DatabaseQuery {
        self.query().end_at(value)
    }

    pub fn end_at_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> DatabaseQuery {
        self.query().end_at_with_key(value, key)
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> DatabaseQuery {
        self.query().equal_to(value)
    }

    pub fn equal_to_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> DatabaseQuery {
        self.query().equal_to_with_key(value, key)
    }

    pub fn limit_to_first(&self, limit: u32) -> DatabaseQuery {
        self.query().limit_to_first(limit)
    }

    pub fn limit_to_last(&self, limit: u32) -> DatabaseQuery {
        self.query().limit_to_last(limit)
    }

    pub async fn once(&self, event: EventType) -> DatabaseResult<DataSnapshot> {
        self.query().once(event).await
    }

    pub async fn once_with_callbacks<S, E>(
        &self,
        event: EventType,
        on_success: S,
        on_error: E,
    ) -> DatabaseResult<DataSnapshot>
    where
        S: FnOnce(&DataSnapshot),
        E: FnOnce(&DatabaseError),
    {
        self.query()
            .once_with_callbacks(event, on_success, on_error)
            .await
    }

    pub async fn on<S, E>(
        &self,
        event: EventType,
        on_value: S,
        on_error: E,
    ) -> DatabaseResult<ListenerHandle>
    where
        S: Fn(DataSnapshot) + Send + Sync + 'static,
        E: Fn(DatabaseError) + Send + Sync + 'static,
    {
        self.query().on(event, on_value, on_error).await
    }

    pub async fn off(&self, event: EventType, handle: &ListenerHandle) -> DatabaseResult<()> {
        self.query().off(event, handle).await
    }

    /// Replaces the value at this location. The priority is sent as `null`,
    /// which the engine treats as "leave unchanged".
    pub async fn set(&self, value: impl Into<Value>) -> DatabaseResult<()> {
        self.write(value.into(), Value::Null).await
    }

    pub async fn set_with_priority(
        &self,
        value: impl Into<Value>,
        priority: impl Into<Value>,
    ) -> DatabaseResult<()> {
        self.write(value.into(), priority.into()).await
    }

    /// Sets only the ordering priority; the value slot is sent as `null`.
    pub async fn set_priority(&self, priority: impl Into<Value>) -> DatabaseResult<()> {
        self.write(Value::Null, priority.into()).await
    }

    /// Deletes the node by sending `null` for both value and priority.
    ///
    /// Relies on the engine reading an explicit `null` priority together with
    /// a `null` value as "clear the priority as well".
    pub async fn remove(&self) -> DatabaseResult<()> {
        self.write(Value::Null, Value::Null).await
    }

    /// Merges `values` into this location; each key may be a nested
    /// slash-separated path. Merging happens in the engine.
    pub async fn update(&self, values: Map<String, Value>) -> DatabaseResult<()> {
        let args = vec![self.url_arg(), self.path_arg(), Value::Object(values)];
        self.database
            .invoke(Operation::Update, args)
            .await
            .map(|_| ())
    }

    /// Asks the engine to mint a new ordered child key, writes `value` there
    /// and returns a reference to the new child.
    pub async fn push(&self, value: impl Into<Value>) -> DatabaseResult<DatabaseReference> {
        let args = vec![self.url_arg(), self.path_arg(), value.into()];
        let outcome = self.database.invoke(Operation::Push, args).await?;
        let outcome: PushOutcome = serde_json::from_value(outcome)
            .map_err(|err| internal_error(format!("malformed push outcome: {err}")))?;

        let (key, reported_path) = outcome.into_parts();
        if normalize_path(&key).len() != 1 {
            return Err(internal_error(format!("push returned an unusable key '{key}'")));
        }

        let child = self.child(&key);
        if let Some(reported) = reported_path.as_deref() {
            if normalize_path(reported) != child.path {
                LOGGER.warn(format!(
                    "push reported path {reported} but the minted key resolves to {}",
                    child.path()
                ));
            }
        }
        Ok(child)
    }

    async fn write(&self, value: Value, priority: Value) -> DatabaseResult<()> {
        let args = vec![self.url_arg(), self.path_arg(), value, priority];
        self.database.invoke(Operation::Set, args).await.map(|_| ())
    }

    fn url_arg(&self) -> Value {
        Value::String(self.database.url().to_string())
    }

    fn path_arg(&self) -> Value {
        Value::String(self.path())
    }
}

impl DatabaseQuery {
    pub fn reference(&self) -> &DatabaseReference {
        &self.reference
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    fn derive(&self, params: QueryParams) -> Self {
        Self {
            reference: self.reference.clone(),
            params,
        }
    }

    /// Orders children by the value at `path`; replaces any previous ordering.
    pub fn order_by_child(&self, path: impl Into<String>) -> Self {
        self.derive(self.params.with_order(OrderStrategy::Child(path.into())))
    }

    pub fn order_by_key(&self) -> Self {
        self.derive(self.params.with_order(OrderStrategy::Key))
    }

    pub fn order_by_priority(&self) -> Self {
        self.derive(self.params.with_order(OrderStrategy::Priority))
    }

    pub fn order_by_value(&self) -> Self {
        self.derive(self.params.with_order(OrderStrategy::Value))
    }

    /// Appends a `startAt` constraint. Constraints accumulate in call order
    /// and are never checked on the client.
    pub fn start_at(&self, value: impl Into<Value>) -> Self {
        self.constrain(RangeConstraint::StartAt {
            value: value.into(),
            key: None,
        })
    }

    pub fn start_at_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> Self {
        self.constrain(RangeConstraint::StartAt {
            value: value.into(),
            key: Some(key.into()),
        })
    }

    pub fn end_at(&self, value: impl Into<Value>) -> Self {
        self.constrain(RangeConstraint::EndAt {
            value: value.into(),
            key: None,
        })
    }

    pub fn end_at_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> Self {
        self.constrain(RangeConstraint::EndAt {
            value: value.into(),
            key: Some(key.into()),
        })
    }

    pub fn equal_to(&self, value: impl Into<Value>) -> Self {
        self.constrain(RangeConstraint::EqualTo {
            value: value.into(),
            key: None,
        })
    }

    pub fn equal_to_with_key(&self, value: impl Into<Value>, key: impl Into<String>) -> Self {
        self.constrain(RangeConstraint::EqualTo {
            value: value.into(),
            key: Some(key.into()),
        })
    }

    /// Keeps the first `limit` children; replaces any previous limit.
    pub fn limit_to_first(&self, limit: u32) -> Self {
        self.derive(self.params.with_limit(QueryLimit::First(limit)))
    }

    /// Keeps the last `limit` children; replaces any previous limit.
    pub fn limit_to_last(&self, limit: u32) -> Self {
        self.derive(self.params.with_limit(QueryLimit::Last(limit)))
    }

    fn constrain(&self, constraint: RangeConstraint) -> Self {
        self.derive(self.params.with_constraint(constraint))
    }

    /// Reads the query once, without leaving a listener behind.
    pub async fn once(&self, event: EventType) -> DatabaseResult<DataSnapshot> {
        let args = self.listen_args(event, &ListenMode::Once);
        let outcome = self.reference.database.invoke(Operation::On, args).await?;
        DataSnapshot::from_outcome(self.reference.clone(), outcome)
    }

    /// [`once`](Self::once) that also reports its single outcome to a callback
    /// before returning it.
    pub async fn once_with_callbacks<S, E>(
        &self,
        event: EventType,
        on_success: S,
        on_error: E,
    ) -> DatabaseResult<DataSnapshot>
    where
        S: FnOnce(&DataSnapshot),
        E: FnOnce(&DatabaseError),
    {
        match self.once(event).await {
            Ok(snapshot) => {
                on_success(&snapshot);
                Ok(snapshot)
            }
            Err(err) => {
                on_error(&err);
                Err(err)
            }
        }
    }

    /// Registers a listener under a fresh subscription id.
    ///
    /// `on_value` receives one snapshot per delivery, in delivery order.
    /// Errors delivered later go to `on_error` and do not end the
    /// subscription. If the registration itself is rejected, `on_error` sees
    /// the error once, the same error is returned, and `on_value` is never
    /// called.
    pub async fn on<S, E>(
        &self,
        event: EventType,
        on_value: S,
        on_error: E,
    ) -> DatabaseResult<ListenerHandle>
    where
        S: Fn(DataSnapshot) + Send + Sync + 'static,
        E: Fn(DatabaseError) + Send + Sync + 'static,
    {
        let database = &self.reference.database;
        let registry = database.inner.subscriptions.clone();
        let id = registry.reserve(&self.reference.path(), event)?;
        let on_error = Arc::new(on_error);

        let sink: DeliverySink = {
            let reference = self.reference.clone();
            let registry = registry.clone();
            let id = id.clone();
            let on_error = on_error.clone();
            Arc::new(move |outcome: Result<Value, DatabaseError>| {
                if !registry.accepts_delivery(&id) {
                    LOGGER.debug(format!("dropping delivery for cancelled listener {id}"));
                    return;
                }
                let snapshot = outcome
                    .and_then(|payload| DataSnapshot::from_outcome(reference.clone(), payload));
                match snapshot {
                    Ok(snapshot) => on_value(snapshot),
                    Err(err) => {
                        if !err.is_bridge_error() {
                            LOGGER.warn(format!("listener {id} got an unreadable payload: {err}"));
                        }
                        on_error(err);
                    }
                }
            })
        };

        let call = database.call(
            Operation::On,
            self.listen_args(event, &ListenMode::Subscription(id.clone())),
        );
        LOGGER.debug(format!(
            "registering {event} listener {id} at {}",
            self.reference.path()
        ));
        match database.inner.bridge.listen(call, sink).await {
            Ok(()) => {
                registry.activate(&id);
                Ok(ListenerHandle::new(id, event, self.clone()))
            }
            Err(err) => {
                registry.discard(&id);
                on_error(err.clone());
                Err(err)
            }
        }
    }

    /// Cancels the listener behind `handle`.
    ///
    /// Deliveries that arrive while the call is in flight are dropped. If the
    /// bridge rejects the cancellation the listener stays registered.
    pub async fn off(&self, event: EventType, handle: &ListenerHandle) -> DatabaseResult<()> {
        let database = &self.reference.database;
        let registry = &database.inner.subscriptions;
        let path = self.reference.path();
        let previous = registry.begin_cancel(handle.id(), &path, event)?;

        let args = vec![
            self.reference.url_arg(),
            Value::String(path),
            Value::String(handle.id().to_string()),
        ];
        match database.invoke(Operation::Off, args).await {
            Ok(_) => {
                registry.discard(handle.id());
                LOGGER.debug(format!("cancelled listener {}", handle.id()));
                Ok(())
            }
            Err(err) => {
                registry.restore(handle.id(), previous);
                Err(err)
            }
        }
    }

    fn listen_args(&self, event: EventType, mode: &ListenMode) -> Vec<Value> {
        vec![
            self.reference.url_arg(),
            self.reference.path_arg(),
            Value::String(event.as_str().to_string()),
            self.params.order_to_wire(),
            self.params.constraints_to_wire(),
            self.params.limit_to_wire(),
            mode.to_wire(),
        ]
    }
}

/// Splits a path into segments, ignoring leading, trailing and repeated slashes.
pub(crate) fn normalize_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
