//! Configuration for the relaydelay collector.
//!
//! The configuration is read once at startup from `config.yml` inside the configuration
//! directory. Every section has defaults except for the relay table, which names the relays whose
//! link latency is exported. Some values can be overridden from the command line or the
//! environment through [`OverridableConfig`].
#![warn(missing_docs)]

mod config;

pub use crate::config::*;
