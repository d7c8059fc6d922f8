//! Boundary between the client and the engine that actually stores the data.
//!
//! Every client operation becomes a [`BridgeCall`]: a plugin name, an
//! operation name and positional JSON arguments. The engine may live in a
//! native plugin, another process, or in memory ([`InMemoryBridge`]).
//!
//! [`InMemoryBridge`]: crate::database::InMemoryBridge

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::oneshot;
use serde_json::Value;

use crate::database::constants::{OP_OFF, OP_ON, OP_PUSH, OP_SET, OP_SET_ONLINE, OP_UPDATE};
use crate::database::error::{internal_error, DatabaseError, DatabaseResult};

/// Receives every outcome the bridge delivers for a registered listener.
pub type DeliverySink = Arc<dyn Fn(Result<Value, DatabaseError>) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    On,
    Off,
    Set,
    Push,
    Update,
    SetOnline,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::On => OP_ON,
            Operation::Off => OP_OFF,
            Operation::Set => OP_SET,
            Operation::Push => OP_PUSH,
            Operation::Update => OP_UPDATE,
            Operation::SetOnline => OP_SET_ONLINE,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named operation with its ordered arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeCall {
    pub plugin: String,
    pub operation: Operation,
    pub args: Vec<Value>,
}

impl BridgeCall {
    pub fn new(plugin: impl Into<String>, operation: Operation, args: Vec<Value>) -> Self {
        Self {
            plugin: plugin.into(),
            operation,
            args,
        }
    }

    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&Value::Null)
    }

    pub(crate) fn str_arg(&self, index: usize) -> &str {
        self.arg(index).as_str().unwrap_or_default()
    }
}

/// Executes operations against the engine.
///
/// Errors returned by a bridge should use
/// [`DatabaseErrorCode::Bridge`](crate::database::error::DatabaseErrorCode::Bridge);
/// the client hands them to the caller untouched.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Bridge: Send + Sync {
    /// Runs a one-shot operation and resolves with its single outcome.
    async fn invoke(&self, call: BridgeCall) -> DatabaseResult<Value>;

    /// Registers a repeatable listener. Resolves once the registration is
    /// acknowledged; deliveries go to `sink`, in order, until an `off` call
    /// carrying the same subscription id completes.
    async fn listen(&self, call: BridgeCall, sink: DeliverySink) -> DatabaseResult<()>;
}

/// Callback-style transport, the shape of a platform plugin `exec`: each
/// outcome of `call` is reported through `sink`.
pub trait Exec: Send + Sync {
    fn exec(&self, call: BridgeCall, sink: DeliverySink);
}

/// Adapts an [`Exec`] transport into a [`Bridge`].
///
/// One-shot calls resolve with the first outcome the transport reports.
/// Listen calls are acknowledged as soon as they are handed to the transport,
/// so a rejected registration shows up as a delivered error.
pub struct ExecBridge<E> {
    exec: E,
}

impl<E: Exec> ExecBridge<E> {
    pub fn new(exec: E) -> Self {
        Self { exec }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<E: Exec> Bridge for ExecBridge<E> {
    async fn invoke(&self, call: BridgeCall) -> DatabaseResult<Value> {
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));
        let sink: DeliverySink = Arc::new(move |outcome: Result<Value, DatabaseError>| {
            if let Some(sender) = sender.lock().unwrap().take() {
                let _ = sender.send(outcome);
            }
        });
        let operation = call.operation;
        self.exec.exec(call, sink);
        receiver.await.map_err(|_| {
            internal_error(format!(
                "bridge dropped '{operation}' call without reporting an outcome"
            ))
        })?
    }

    async fn listen(&self, call: BridgeCall, sink: DeliverySink) -> DatabaseResult<()> {
        self.exec.exec(call, sink);
        Ok(())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::database::error::bridge_error;
    use futures::executor::block_on;
    use serde_json::json;

    struct EchoExec;

    impl Exec for EchoExec {
        fn exec(&self, call: BridgeCall, sink: DeliverySink) {
            match call.operation {
                Operation::Set => {
                    sink(Ok(call.arg(2).clone()));
                    // later outcomes of a one-shot call are ignored
                    sink(Ok(json!("ignored")));
                }
                Operation::Update => sink(Err(bridge_error("denied"))),
                Operation::On => {
                    sink(Ok(json!(1)));
                    sink(Ok(json!(2)));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn invoke_resolves_with_first_outcome() {
        let bridge = ExecBridge::new(EchoExec);
        let call = BridgeCall::new("P", Operation::Set, vec![json!(""), json!("/a"), json!(5)]);
        assert_eq!(block_on(bridge.invoke(call)).unwrap(), json!(5));
    }

    #[test]
    fn invoke_passes_errors_through() {
        let bridge = ExecBridge::new(EchoExec);
        let err = block_on(bridge.invoke(BridgeCall::new("P", Operation::Update, vec![])))
            .unwrap_err();
        assert!(err.is_bridge_error());
        assert_eq!(err.message(), "denied");
    }

    #[test]
    fn invoke_fails_when_transport_never_answers() {
        let bridge = ExecBridge::new(EchoExec);
        let err = block_on(bridge.invoke(BridgeCall::new("P", Operation::Off, vec![])))
            .unwrap_err();
        assert_eq!(err.code_str(), "database/internal");
    }

    #[test]
    fn listen_forwards_every_delivery() {
        let bridge = ExecBridge::new(EchoExec);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink: DeliverySink = Arc::new(move |outcome: Result<Value, DatabaseError>| {
            captured.lock().unwrap().push(outcome.unwrap());
        });
        block_on(bridge.listen(BridgeCall::new("P", Operation::On, vec![]), sink)).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!(1), json!(2)]);
    }
}
