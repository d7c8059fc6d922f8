use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::database::{Bridge, BridgeCall, DeliverySink};
use crate::database::error::{DatabaseError, DatabaseResult};

/// Bridge double that records every call and answers from a script.
///
/// One-shot calls pop the next scripted outcome (`Ok(null)` when the script
/// is empty). Listen calls keep their sink so tests can push deliveries.
#[derive(Default)]
pub struct RecordingBridge {
    calls: Mutex<Vec<BridgeCall>>,
    outcomes: Mutex<VecDeque<DatabaseResult<Value>>>,
    listen_failures: Mutex<VecDeque<DatabaseError>>,
    sinks: Mutex<HashMap<String, DeliverySink>>,
}

impl RecordingBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond_with(&self, outcome: DatabaseResult<Value>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn fail_next_listen(&self, error: DatabaseError) {
        self.listen_failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> BridgeCall {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no bridge call recorded")
    }

    /// Pushes an outcome into the listener registered under `id`.
    pub fn deliver(&self, id: &str, outcome: DatabaseResult<Value>) {
        let sink = self
            .sinks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no listener registered under '{id}'"));
        sink(outcome);
    }

    pub fn listener_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sinks.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Bridge for RecordingBridge {
    async fn invoke(&self, call: BridgeCall) -> DatabaseResult<Value> {
        self.calls.lock().unwrap().push(call);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Null))
    }

    async fn listen(&self, call: BridgeCall, sink: DeliverySink) -> DatabaseResult<()> {
        let id = call.str_arg(6).to_string();
        self.calls.lock().unwrap().push(call);
        if let Some(error) = self.listen_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sinks.lock().unwrap().insert(id, sink);
        Ok(())
    }
}
