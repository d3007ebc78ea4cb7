//! Variable-length integer encodings used by pack headers and deltas.
//!
//! Three flavours appear in the format:
//!
//! - [`VarIntLE`]: little-endian groups with a continuation bit. Record
//!   headers use a 4-bit first group; delta size headers use 7.
//! - [`VarIntBE`]: big-endian groups where each continuation adds one, so
//!   no value has two encodings. Used for `OFS_DELTA` base offsets.
//! - [`PackedInt56LE`]: a presence bitmap followed by the non-zero bytes of
//!   a 56-bit value. Used by delta copy instructions.

use std::io::Read;

use crate::PackError;

fn read_byte(input: &mut impl Read) -> Result<u8, PackError> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf).map_err(eof)?;
    Ok(buf[0])
}

fn eof(err: std::io::Error) -> PackError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        PackError::UnexpectedEof
    } else {
        PackError::Io(err)
    }
}

pub struct VarIntLE;

impl VarIntLE {
    /// Encode `value`, putting `shift` bits in the first byte and 7 in the rest.
    pub fn write(mut value: u64, mut shift: u32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4);
        let mut mask = (1u64 << shift) - 1;

        while value > mask {
            bytes.push(0x80 | (value & mask) as u8);
            value >>= shift;
            mask = 0x7f;
            shift = 7;
        }
        bytes.push(value as u8);
        bytes
    }

    /// Decode a value, returning the untouched first byte alongside it so
    /// callers can pull out the bits above `shift`.
    pub fn read(input: &mut impl Read, mut shift: u32) -> Result<(u8, u64), PackError> {
        let first = read_byte(input)?;
        let mut value = u64::from(first) & ((1u64 << shift) - 1);
        let mut byte = first;

        while byte >= 0x80 {
            byte = read_byte(input)?;
            if shift < 64 {
                value |= u64::from(byte & 0x7f) << shift;
            }
            shift += 7;
        }
        Ok((first, value))
    }
}

pub struct VarIntBE;

impl VarIntBE {
    pub fn write(mut value: u64) -> Vec<u8> {
        let mut bytes = vec![(value & 0x7f) as u8];
        loop {
            value >>= 7;
            if value == 0 {
                break;
            }
            value -= 1;
            bytes.push(0x80 | (value & 0x7f) as u8);
        }
        bytes.reverse();
        bytes
    }

    pub fn read(input: &mut impl Read) -> Result<u64, PackError> {
        let mut byte = read_byte(input)?;
        let mut value = u64::from(byte & 0x7f);

        while byte >= 0x80 {
            byte = read_byte(input)?;
            value = ((value + 1) << 7) | u64::from(byte & 0x7f);
        }
        Ok(value)
    }
}

pub struct PackedInt56LE;

impl PackedInt56LE {
    /// The first byte is a bitmap of which of the seven value bytes follow.
    pub fn write(value: u64) -> Vec<u8> {
        let mut bytes = vec![0u8];
        for i in 0..7 {
            let byte = ((value >> (8 * i)) & 0xff) as u8;
            if byte != 0 {
                bytes[0] |= 1 << i;
                bytes.push(byte);
            }
        }
        bytes
    }

    /// Decode the bytes announced by `header`, which the caller has already read.
    pub fn read(input: &mut impl Read, header: u8) -> Result<u64, PackError> {
        let mut value = 0u64;
        for i in 0..7 {
            if header & (1 << i) != 0 {
                value |= u64::from(read_byte(input)?) << (8 * i);
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn varint_le_record_header() {
        // A 4-bit first group leaves room for the type in bits 4..7.
        assert_eq!(VarIntLE::write(15, 4), vec![0x0f]);
        assert_eq!(VarIntLE::write(16, 4), vec![0x80, 0x01]);
        assert_eq!(VarIntLE::write(523, 4), vec![0x8b, 0x20]);

        let (first, value) = VarIntLE::read(&mut Cursor::new([0x8b | 0x30, 0x20]), 4).unwrap();
        assert_eq!(value, 523);
        assert_eq!((first >> 4) & 7, 3);
    }

    #[test]
    fn varint_le_seven_bit_groups() {
        for value in [0u64, 1, 127, 128, 300, 0xffff_ffff, u64::from(u32::MAX) << 8] {
            let bytes = VarIntLE::write(value, 7);
            let (_, decoded) = VarIntLE::read(&mut Cursor::new(bytes), 7).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn varint_be_has_no_redundant_encodings() {
        assert_eq!(VarIntBE::write(127), vec![0x7f]);
        assert_eq!(VarIntBE::write(128), vec![0x80, 0x00]);
        assert_eq!(VarIntBE::write(16511), vec![0xff, 0x7f]);
        assert_eq!(VarIntBE::write(16512), vec![0x80, 0x80, 0x00]);

        for value in [0u64, 127, 128, 16511, 16512, 1 << 40] {
            assert_eq!(VarIntBE::read(&mut Cursor::new(VarIntBE::write(value))).unwrap(), value);
        }
    }

    #[test]
    fn packed_int_skips_zero_bytes() {
        let value = (19u64 << 32) | 14;
        let bytes = PackedInt56LE::write(value);
        assert_eq!(bytes, vec![0b0001_0001, 14, 19]);

        let mut cursor = Cursor::new(&bytes[1..]);
        assert_eq!(PackedInt56LE::read(&mut cursor, bytes[0]).unwrap(), value);
        assert_eq!(PackedInt56LE::write(0), vec![0]);
    }

    #[test]
    fn truncated_input_is_eof() {
        assert!(matches!(
            VarIntLE::read(&mut Cursor::new([0x80]), 7),
            Err(PackError::UnexpectedEof)
        ));
    }
}
