//! The relaydelay binary.
//!
//! relaydelay periodically reads client telemetry from a document store, extracts the delays
//! measured between clients and each relay, and exports them as Prometheus histograms and
//! summaries labeled by relay.
//!
//! # Usage
//!
//! ```text
//! relaydelay --config /etc/relaydelay run
//! relaydelay --config /etc/relaydelay config show
//! relaydelay --config /etc/relaydelay healthcheck --mode ready
//! relaydelay decode blob.txt
//! ```
//!
//! The config folder must contain a `config.yml`. Most values have defaults; the relay table under
//! `relays.nodes` maps relay ids to their addresses and should always be filled in.

mod cli;
mod cliapp;
mod decode;
mod healthcheck;
mod setup;

use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            relaydelay_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
