//! Newline-delimited JSON framing shared by both ends of a stream.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TransportError;

/// Maximum message size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Reads one JSON line and decodes it.
///
/// Blank lines are skipped. Returns `TransportError::Eof` when the stream
/// ends before a message starts.
pub fn read_message<T, R>(reader: &mut R) -> Result<T, TransportError>
where
    T: DeserializeOwned,
    R: BufRead + ?Sized,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Err(TransportError::Eof);
        }
        if bytes_read > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: bytes_read,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    serde_json::from_str(line.trim_end()).map_err(|e| TransportError::ParseError(e.to_string()))
}

/// Encodes `message` as one JSON line and flushes it.
pub fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    T: Serialize + ?Sized,
    W: Write + ?Sized,
{
    let json =
        serde_json::to_string(message).map_err(|e| TransportError::ParseError(e.to_string()))?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
