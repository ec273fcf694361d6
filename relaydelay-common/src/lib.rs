//! Common utilities shared by the relaydelay crates.
//!
//! This crate has no knowledge of telemetry or relays. It provides the millisecond timestamp
//! type used for the store watermark, and the retry policy used when the store is unreachable.
#![warn(missing_docs)]

mod retry;
mod time;

pub use crate::retry::*;
pub use crate::time::*;
