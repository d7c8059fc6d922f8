//! Synchronous wrappers for callers without an async runtime.
//!
//! Every function drives the matching async operation to completion on a
//! shared multi-threaded Tokio runtime. Do not call them from inside an async
//! context.

pub mod database;

use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::Runtime;

use crate::database::error::{internal_error, DatabaseResult};

static RT: LazyLock<Option<Runtime>> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("firebase-db-blocking")
        .build()
        .ok()
});

fn block_on<T, F>(fut: F) -> DatabaseResult<T>
where
    F: Future<Output = DatabaseResult<T>>,
{
    match RT.as_ref() {
        Some(runtime) => runtime.block_on(fut),
        None => Err(internal_error("failed to start the blocking runtime")),
    }
}
