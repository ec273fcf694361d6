//! Helpers to build telemetry blobs in tests.

use std::io::Write;

use data_encoding::BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;

/// Compresses `bytes` into a single gzip member.
pub fn compress(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Builds a telemetry blob from plaintext.
///
/// The base64 text is wrapped into lines of `line_len` characters, which must be a multiple of
/// four. Pass `usize::MAX` for a single line.
pub fn encode_blob(plaintext: &[u8], line_len: usize) -> String {
    assert!(line_len % 4 == 0 || line_len == usize::MAX);

    let encoded = BASE64.encode(&compress(plaintext));
    encoded
        .as_bytes()
        .chunks(line_len)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Builds a plaintext telemetry document from `(relay id, delay)` pairs.
pub fn telemetry_json(
    upstream_to_relay: &[(i64, f64)],
    relay_to_upstream: &[(i64, f64)],
) -> String {
    let entries = |pairs: &[(i64, f64)]| {
        pairs
            .iter()
            .map(|&(id, delay)| serde_json::json!({"relayID": id, "delay": delay}))
            .collect::<Vec<_>>()
    };

    serde_json::json!({
        "ur_link_info": {
            "U_R_self": entries(upstream_to_relay),
            "R_U_self": entries(relay_to_upstream),
        }
    })
    .to_string()
}
