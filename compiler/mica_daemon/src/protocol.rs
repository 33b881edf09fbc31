//! Length-delimited JSON frames.
//!
//! Every request and response is one JSON object preceded by a 4-byte
//! big-endian length. Requests carry a required `command` string plus
//! named arguments; responses always include the `platform` and
//! `python_version` metadata keys on top of whatever the handler
//! produced.

use std::io::{Read, Write};

use serde_json::Value;
use thiserror::Error;

/// Frames larger than this are assumed to be garbage, not requests.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    Closed,
    #[error("frame too large: {0} bytes")]
    TooLarge(u32),
    #[error("frame is not valid json: {0}")]
    BadJson(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one frame. `Closed` means the peer hung up cleanly between
/// frames.
pub fn receive(conn: &mut impl Read) -> Result<Value, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    match conn.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::Closed);
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    conn.read_exact(&mut payload)?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Write one frame.
pub fn send(conn: &mut impl Write, value: &Value) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(value)?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::TooLarge(u32::MAX)
    })?;
    conn.write_all(&len.to_be_bytes())?;
    conn.write_all(&payload)?;
    conn.flush()?;
    Ok(())
}

/// Encode a sequence of requests into a byte stream (client side and
/// tests).
pub fn encode_frames(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        // Writing to a Vec cannot fail.
        let _ = send(&mut out, value);
    }
    out
}

/// Decode every frame in a byte stream (client side and tests).
pub fn decode_frames(mut bytes: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    let mut out = Vec::new();
    loop {
        match receive(&mut bytes) {
            Ok(value) => out.push(value),
            Err(ProtocolError::Closed) => return Ok(out),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn frames_round_trip() {
        let values = vec![
            json!({"command": "status"}),
            json!({"command": "check", "files": ["a.py"]}),
        ];
        let bytes = encode_frames(&values);
        let decoded = decode_frames(&bytes).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn empty_stream_is_clean_close() {
        let decoded = decode_frames(&[]).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut bytes = encode_frames(&[json!({"command": "status"})]);
        bytes.truncate(bytes.len() - 2);
        assert!(decode_frames(&bytes).is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let bytes = (MAX_FRAME_LEN + 1).to_be_bytes().to_vec();
        let mut reader: &[u8] = &bytes;
        assert!(matches!(
            receive(&mut reader),
            Err(ProtocolError::TooLarge(_))
        ));
    }
}
