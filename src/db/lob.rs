//! Large object text reading.

use crate::error::{DaoError, DaoResult};
use crate::models::Value;
use std::io::Read;

/// Decoding applied to a byte-stream large object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LobEncoding {
    #[default]
    Utf8,
    /// UTF-16 honoring a byte order mark; big-endian without one.
    Utf16,
    Utf16Le,
    Utf16Be,
}

/// A large object handle.
pub enum LargeObject<R: Read> {
    /// Character stream, already UTF-8 text.
    Chars(R),
    /// Byte stream decoded with the given encoding.
    Bytes(R, LobEncoding),
}

/// Read a large object into a string.
pub fn read_lob_string<R: Read>(lob: LargeObject<R>) -> DaoResult<String> {
    match lob {
        LargeObject::Chars(mut reader) => {
            let mut text = String::new();
            reader
                .read_to_string(&mut text)
                .map_err(|e| DaoError::data_access_caused_by("Failed to read character LOB", None, e))?;
            Ok(text)
        }
        LargeObject::Bytes(mut reader, encoding) => {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| DaoError::data_access_caused_by("Failed to read binary LOB", None, e))?;
            decode_bytes(&bytes, encoding)
        }
    }
}

/// Text content of a LOB column value.
///
/// Strings pass through, bytes are decoded with `encoding`, NULL yields `None`.
pub fn lob_value_to_string(value: &Value, encoding: LobEncoding) -> DaoResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => read_lob_string(LargeObject::Chars(s.as_bytes())).map(Some),
        Value::Bytes(b) => read_lob_string(LargeObject::Bytes(b.as_slice(), encoding)).map(Some),
        other => Err(DaoError::conversion(format!(
            "Value of type {} is not a large object",
            other.type_name()
        ))),
    }
}

fn decode_bytes(bytes: &[u8], encoding: LobEncoding) -> DaoResult<String> {
    match encoding {
        LobEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| DaoError::conversion(format!("LOB is not valid UTF-8: {e}"))),
        LobEncoding::Utf16 => match bytes {
            [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
            [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
            _ => decode_utf16(bytes, u16::from_be_bytes),
        },
        LobEncoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        LobEncoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> DaoResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(DaoError::conversion(
            "UTF-16 LOB has an odd number of bytes",
        ));
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| DaoError::conversion(format!("LOB is not valid UTF-16: {e}")))
}
