//! Progress normalization.
//!
//! This module turns raw byte counts from the native facility into the
//! percentage notifications delivered to callers.

mod bridge;

pub use bridge::ProgressBridge;
