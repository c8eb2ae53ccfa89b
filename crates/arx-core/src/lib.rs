//! Foundational low-level utilities shared across arx crates.
//!
//! Provides atomic file-write helpers and time utilities used by the
//! evidence store for upload naming and durable writes.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_bytes_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
