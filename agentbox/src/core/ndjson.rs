//! Newline-delimited JSON framing for the `run-agent` stream.
//!
//! The encoder writes one record per line. The decoder accepts the response
//! body in whatever chunks the network delivers, keeps the trailing partial
//! line across reads, and yields complete records in order.

use serde::Serialize;
use thiserror::Error;

use crate::core::types::StreamRecord;

/// A complete line that is not a valid stream record.
#[derive(Debug, Error)]
#[error("malformed stream record {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

/// Serialize a value as one NDJSON line (trailing newline included).
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = serde_json::to_vec(value)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Incremental record decoder.
///
/// Works on bytes so multi-byte characters split across chunks are
/// reassembled before parsing. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every record completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamRecord, DecodeError>> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(record) = parse_line(&self.buffer[start..end]) {
                records.push(record);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        records
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Parse a final line the server did not terminate with a newline.
    pub fn finish(self) -> Option<Result<StreamRecord, DecodeError>> {
        parse_line(&self.buffer)
    }
}

fn parse_line(raw: &[u8]) -> Option<Result<StreamRecord, DecodeError>> {
    let line = raw.strip_suffix(b"\r").unwrap_or(raw);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        serde_json::from_slice(line).map_err(|source| DecodeError {
            line: String::from_utf8_lossy(line).into_owned(),
            source,
        }),
    )
}
