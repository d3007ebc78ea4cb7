//! The `"<type> <size>\0"` envelope in front of every stored object.

use crate::{ObjectError, ObjectType};

/// Parse an object header. Returns `(type, content_size, header_len)`, where
/// `header_len` counts the terminating NUL.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing null terminator".into()))?;

    let (kind, size) = data[..nul]
        .iter()
        .position(|&b| b == b' ')
        .map(|sp| (&data[..sp], &data[sp + 1..nul]))
        .ok_or_else(|| ObjectError::InvalidHeader("missing space in header".into()))?;

    let kind = ObjectType::from_bytes(kind)?;
    let size = std::str::from_utf8(size)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            ObjectError::InvalidHeader(format!("invalid size: {}", String::from_utf8_lossy(size)))
        })?;

    Ok((kind, size, nul + 1))
}

pub fn write_header(kind: ObjectType, size: usize) -> Vec<u8> {
    format!("{kind} {size}\0").into_bytes()
}
