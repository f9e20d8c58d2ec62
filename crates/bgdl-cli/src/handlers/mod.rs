//! Command handlers.
//!
//! Each handler takes the composed [`CliContext`](crate::CliContext) and
//! delegates to the transfer manager.

pub mod fetch;
pub mod list;
pub mod stop;
