//! # Realtime Database client over a plugin bridge
//!
//! References, queries and snapshots for a realtime hierarchical database
//! whose engine lives behind an opaque [`Bridge`]: a native mobile plugin, a
//! callback transport wrapped in [`ExecBridge`], or the bundled
//! [`InMemoryBridge`].
//!
//! The client never touches the tree itself. It builds immutable query state,
//! turns every operation into a named bridge call with positional JSON
//! arguments, and turns what comes back into [`DataSnapshot`]s. Repeatable
//! listeners are tracked by subscription id so that cancellation is exact even
//! when several identical listeners share a location.
//!
//! ## Features
//!
//! - Path navigation (child, parent, root) with normalized paths
//! - Immutable query builders (ordering, range constraints, limits)
//! - One-shot reads and id-tracked repeatable listeners
//! - Writes with priority, priority-only updates, merges, push and remove
//! - Connectivity toggles per store
//! - Snapshots with lazy child value lookup
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use firebase_db_bridge::database::*;
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let database = Database::new(Arc::new(InMemoryBridge::new()));
//!
//!     let scores = database.reference("/scores");
//!     scores.child("ada").set(json!({ "points": 30 })).await?;
//!     scores.child("alan").set(json!({ "points": 20 })).await?;
//!
//!     let top = scores.order_by_child("points").limit_to_last(1);
//!     let snapshot = top.once(EventType::Value).await?;
//!     for child in snapshot.children() {
//!         println!("{} => {:?}", child.key(), child.val());
//!     }
//!
//!     let handle = scores
//!         .on(
//!             EventType::Value,
//!             |snapshot| println!("scores now {:?}", snapshot.val()),
//!             |err| eprintln!("listener failed: {err}"),
//!         )
//!         .await?;
//!     scores.child("grace").set(json!({ "points": 40 })).await?;
//!     handle.cancel().await?;
//!
//!     Ok(())
//! }
//! ```

mod api;
mod bridge;
mod constants;
pub mod error;
mod event;
mod logger;
mod memory;
mod options;
mod push_id;
mod query;
mod snapshot;
mod subscription;

#[doc(inline)]
pub use api::{Database, DatabaseQuery, DatabaseReference};

#[doc(inline)]
pub use bridge::{Bridge, BridgeCall, DeliverySink, Exec, ExecBridge, Operation};

pub use constants::DATABASE_PLUGIN_NAME;

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

pub use event::EventType;

#[doc(inline)]
pub use memory::InMemoryBridge;

pub use options::DatabaseOptions;

#[doc(inline)]
pub use query::{OrderStrategy, QueryLimit, QueryParams, RangeConstraint};

#[doc(inline)]
pub use snapshot::{ChildEntry, ChildSnapshot, DataSnapshot, RawPayload};

#[doc(inline)]
pub use subscription::{ListenerHandle, RandomIdGenerator, SubscriptionId, SubscriptionIdGenerator};
