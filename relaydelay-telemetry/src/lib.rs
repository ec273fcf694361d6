//! Extraction of relay link latencies from telemetry blobs.
//!
//! Telemetry records hold an opaque blob: gzip compressed JSON, base64 encoded and split into
//! newline separated segments. Turning a blob into recorded latencies takes three steps:
//!
//!  1. The [`Decoder`] reassembles the segments and decompresses the payload.
//!  2. [`parse`] extracts the delays per relay for both link directions.
//!  3. The [`Aggregator`] maps relay ids onto configured [`RelayNode`]s and records an
//!     [`Observation`] for every known relay into an [`ObservationSink`].
//!
//! Everything in this crate is synchronous and free of I/O. Reading records from the store and
//! exporting the recorded metrics are left to the caller.
#![warn(missing_docs)]

mod aggregator;
mod decoder;
mod parser;
mod relay;

#[cfg(any(test, feature = "test"))]
pub mod testutils;

pub use crate::aggregator::*;
pub use crate::decoder::*;
pub use crate::parser::*;
pub use crate::relay::*;
