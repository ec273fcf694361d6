use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use relaydelay_telemetry::{Decoder, DelayReadings};
use serde::Serialize;
use serde_json::Value;

/// The output of the `decode` command.
#[derive(Debug, Serialize)]
struct DecodedBlob {
    /// The plaintext document, parsed as JSON if possible.
    document: Value,
    /// The delays extracted from the document.
    #[serde(flatten)]
    readings: DelayReadings,
}

/// Decodes a blob and extracts its readings.
fn decode_blob(blob: &str) -> Result<DecodedBlob> {
    let plaintext = Decoder::default()
        .decode(blob)
        .context("failed to decode telemetry blob")?;

    let readings = relaydelay_telemetry::parse(&plaintext)
        .context("failed to extract delays from telemetry document")?;

    let document = serde_json::from_str(&plaintext).unwrap_or(Value::String(plaintext));

    Ok(DecodedBlob { document, readings })
}

#[allow(clippy::print_stdout)]
pub fn decode(matches: &ArgMatches) -> Result<()> {
    let blob = match matches.get_one::<PathBuf>("file") {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut blob = String::new();
            io::stdin()
                .read_to_string(&mut blob)
                .context("failed to read stdin")?;
            blob
        }
    };

    let decoded = decode_blob(&blob)?;
    let output = match matches.get_flag("pretty") {
        true => serde_json::to_string_pretty(&decoded)?,
        false => serde_json::to_string(&decoded)?,
    };

    println!("{output}");
    Ok(())
}
