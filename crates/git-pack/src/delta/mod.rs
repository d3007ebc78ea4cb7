//! Delta encoding and decoding.
//!
//! A delta reconstructs a target from a source:
//!
//! ```text
//! [source_size: VarIntLE/7] [target_size: VarIntLE/7] [op]*
//! ```
//!
//! Ops:
//! - Copy:   `[1xxxxxxx] [present bytes of (size << 32 | offset)]`
//! - Insert: `[0NNNNNNN] [N literal bytes]`

pub mod expander;
pub mod xdelta;

pub use expander::expand;
pub use xdelta::XDelta;

use std::io::{Cursor, Read};

use crate::numbers::{PackedInt56LE, VarIntLE};

/// Largest copy a single op can express.
pub const MAX_COPY_SIZE: usize = 0xff_ffff;
/// Largest insert a single op can express.
pub const MAX_INSERT_SIZE: usize = 0x7f;
/// A copy op whose size bytes are all absent means this many bytes.
pub const GIT_MAX_COPY: usize = 0x10000;

#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    #[error("source size mismatch: delta expects {expected}, source is {actual}")]
    SourceSizeMismatch { expected: usize, actual: usize },

    #[error("target size mismatch: delta declares {expected}, produced {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("copy of {size} bytes at {offset} runs past the source")]
    CopyOutOfRange { offset: usize, size: usize },

    #[error("delta truncated")]
    Truncated,

    #[error("reserved delta opcode 0")]
    ReservedOpcode,
}

/// One delta instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Copy { offset: usize, size: usize },
    Insert(Vec<u8>),
}

impl Op {
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Op::Copy { offset, size } => {
                let value = ((*size as u64) << 32) | *offset as u64;
                let mut bytes = PackedInt56LE::write(value);
                bytes[0] |= 0x80;
                out.extend_from_slice(&bytes);
            }
            Op::Insert(data) => {
                out.push(data.len() as u8);
                out.extend_from_slice(data);
            }
        }
    }

    /// Parse one op whose opcode byte has already been consumed.
    pub fn parse(opcode: u8, input: &mut impl Read) -> Result<Self, DeltaError> {
        if opcode >= 0x80 {
            let value = PackedInt56LE::read(input, opcode).map_err(|_| DeltaError::Truncated)?;
            let offset = (value & 0xffff_ffff) as usize;
            let size = match (value >> 32) as usize {
                0 => GIT_MAX_COPY,
                n => n,
            };
            Ok(Op::Copy { offset, size })
        } else if opcode == 0 {
            Err(DeltaError::ReservedOpcode)
        } else {
            let mut data = vec![0u8; usize::from(opcode)];
            input.read_exact(&mut data).map_err(|_| DeltaError::Truncated)?;
            Ok(Op::Insert(data))
        }
    }

    /// Number of target bytes this op produces.
    pub fn len(&self) -> usize {
        match self {
            Op::Copy { size, .. } => *size,
            Op::Insert(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize a full delta: both size headers followed by the ops.
pub fn encode(source_size: usize, target_size: usize, ops: &[Op]) -> Vec<u8> {
    let mut out = VarIntLE::write(source_size as u64, 7);
    out.extend(VarIntLE::write(target_size as u64, 7));
    for op in ops {
        op.encode(&mut out);
    }
    out
}

/// Parse a delta into its declared sizes and ops.
pub fn parse(delta: &[u8]) -> Result<(usize, usize, Vec<Op>), DeltaError> {
    let mut input = Cursor::new(delta);
    let (source_size, target_size) = read_sizes(&mut input)?;

    let mut ops = Vec::new();
    while (input.position() as usize) < delta.len() {
        let opcode = next_byte(&mut input)?;
        ops.push(Op::parse(opcode, &mut input)?);
    }
    Ok((source_size, target_size, ops))
}

/// Read only the `(source_size, target_size)` header.
pub fn read_sizes(input: &mut impl Read) -> Result<(usize, usize), DeltaError> {
    let source = read_size(input)?;
    let target = read_size(input)?;
    Ok((source, target))
}

fn read_size(input: &mut impl Read) -> Result<usize, DeltaError> {
    VarIntLE::read(input, 7)
        .map(|(_, value)| value as usize)
        .map_err(|_| DeltaError::Truncated)
}

fn next_byte(input: &mut impl Read) -> Result<u8, DeltaError> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte).map_err(|_| DeltaError::Truncated)?;
    Ok(byte[0])
}
