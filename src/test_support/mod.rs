//! Test utilities shared across crate-level unit tests.

pub mod bridge;

pub use bridge::RecordingBridge;
