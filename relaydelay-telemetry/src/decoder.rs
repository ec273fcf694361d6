use std::io::{self, Write};

use data_encoding::BASE64;
use flate2::read::MultiGzDecoder;

/// Default maximum size of a decompressed blob.
pub const DEFAULT_MAX_DECODED_SIZE: usize = 16 * 1024 * 1024;

/// Start size for the [`Sink`]'s internal buffer.
const DECODE_BUFFER_SIZE: usize = 8192;

/// An error returned by [`Decoder::decode`] and [`Decoder::decode_bytes`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A segment of the blob is not valid base64.
    #[error("invalid base64 in segment {segment}")]
    Base64 {
        /// Zero-based index of the offending line in the blob.
        segment: usize,
        /// The underlying decoding error.
        #[source]
        source: data_encoding::DecodeError,
    },
    /// The blob contained no data.
    #[error("empty telemetry blob")]
    Empty,
    /// The compressed payload is corrupt or truncated.
    #[error("failed to decompress telemetry blob")]
    Decompress(#[source] io::Error),
    /// The decompressed payload exceeds the configured limit.
    #[error("decompressed telemetry exceeds {limit} bytes")]
    TooLarge {
        /// The configured limit in bytes.
        limit: usize,
    },
    /// The decompressed payload is not UTF-8 text.
    #[error("decompressed telemetry is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A plain sink for decompressed data with a limit.
///
/// The sink grows up to `limit` bytes and then refuses further writes with
/// [`io::ErrorKind::WriteZero`].
#[derive(Debug, Default)]
struct Sink {
    buffer: Vec<u8>,
    remaining: usize,
}

impl Sink {
    fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            remaining: limit,
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl Write for Sink {
    fn write(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }

        if buf.len() > self.remaining {
            buf = &buf[..self.remaining];
        }

        if self.buffer.is_empty() {
            self.buffer.reserve(DECODE_BUFFER_SIZE.min(self.remaining));
        }

        self.buffer.extend_from_slice(buf);
        self.remaining -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Turns an encoded telemetry blob into plaintext.
///
/// A blob is a gzip stream encoded with the standard base64 alphabet and split into lines. Every
/// line is decoded on its own and the resulting bytes are concatenated before decompression, so
/// lines do not need to be aligned to base64 quanta of the whole stream.
#[derive(Clone, Copy, Debug)]
pub struct Decoder {
    limit: usize,
}

impl Decoder {
    /// Creates a decoder that rejects payloads decompressing to more than `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Decodes a blob into the raw decompressed bytes.
    pub fn decode_bytes(&self, blob: &str) -> Result<Vec<u8>, DecodeError> {
        let compressed = decode_segments(blob)?;
        self.decompress(&compressed)
    }

    /// Decodes a blob into UTF-8 plaintext.
    pub fn decode(&self, blob: &str) -> Result<String, DecodeError> {
        Ok(String::from_utf8(self.decode_bytes(blob)?)?)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut decoder = MultiGzDecoder::new(compressed);
        let mut sink = Sink::new(self.limit);

        match io::copy(&mut decoder, &mut sink) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WriteZero => {
                return Err(DecodeError::TooLarge { limit: self.limit });
            }
            Err(e) => return Err(DecodeError::Decompress(e)),
        }

        Ok(sink.into_inner())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DECODED_SIZE)
    }
}

/// Decodes every non-empty line of the blob and concatenates the raw bytes.
fn decode_segments(blob: &str) -> Result<Vec<u8>, DecodeError> {
    let mut buffer = Vec::with_capacity(blob.len() / 4 * 3);

    for (segment, line) in blob.split('\n').enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let decoded = BASE64
            .decode(line.as_bytes())
            .map_err(|source| DecodeError::Base64 { segment, source })?;
        buffer.extend_from_slice(&decoded);
    }

    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(buffer)
}
