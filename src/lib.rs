#![doc = include_str!("RUSTDOC.md")]

#[cfg(not(target_arch = "wasm32"))]
pub mod blocking;

pub mod database;
pub mod logger;

#[cfg(test)]
pub mod test_support;
