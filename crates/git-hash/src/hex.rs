use crate::HashError;

/// ASCII byte to nibble; 0xff marks a non-hex byte.
const NIBBLE: [u8; 256] = {
    let mut table = [0xffu8; 256];
    let mut i = 0;
    while i < 10 {
        table[b'0' as usize + i] = i as u8;
        i += 1;
    }
    let mut i = 0;
    while i < 6 {
        table[b'a' as usize + i] = 10 + i as u8;
        table[b'A' as usize + i] = 10 + i as u8;
        i += 1;
    }
    table
};

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Lowercase hex encoding of `bytes`.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Decode `hex` into `buf`; `hex` must be exactly twice as long as `buf`.
pub fn decode_into(hex: &str, buf: &mut [u8]) -> Result<(), HashError> {
    let raw = hex.as_bytes();
    if raw.len() != buf.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: buf.len() * 2,
            actual: raw.len(),
        });
    }
    for (i, out) in buf.iter_mut().enumerate() {
        let hi = nibble(raw, i * 2)?;
        let lo = nibble(raw, i * 2 + 1)?;
        *out = (hi << 4) | lo;
    }
    Ok(())
}

/// Decode an even-length hex string.
pub fn decode(hex: &str) -> Result<Vec<u8>, HashError> {
    if hex.len() % 2 != 0 {
        return Err(HashError::InvalidHexLength {
            expected: hex.len() + 1,
            actual: hex.len(),
        });
    }
    let mut buf = vec![0u8; hex.len() / 2];
    decode_into(hex, &mut buf)?;
    Ok(buf)
}

/// True if every character is a hex digit. Unlike [`decode`], odd lengths
/// are accepted, since abbreviated object names can have any length.
pub fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| NIBBLE[b as usize] != 0xff)
}

fn nibble(raw: &[u8], position: usize) -> Result<u8, HashError> {
    match NIBBLE[raw[position] as usize] {
        0xff => Err(HashError::InvalidHex {
            position,
            character: raw[position] as char,
        }),
        n => Ok(n),
    }
}
