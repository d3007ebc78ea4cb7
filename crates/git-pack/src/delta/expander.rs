use std::io::{Cursor, Read};

use super::{read_sizes, DeltaError, Op};

/// Rebuild the target of `delta` from `source`.
///
/// The declared source size is checked before any op runs and the
/// declared target size after the last one.
pub fn expand(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut input = Cursor::new(delta);
    let (source_size, target_size) = read_sizes(&mut input)?;

    if source_size != source.len() {
        return Err(DeltaError::SourceSizeMismatch {
            expected: source_size,
            actual: source.len(),
        });
    }

    let mut target = Vec::with_capacity(target_size);
    let mut opcode = [0u8; 1];

    while input.read(&mut opcode).map_err(|_| DeltaError::Truncated)? == 1 {
        match Op::parse(opcode[0], &mut input)? {
            Op::Copy { offset, size } => {
                let end = offset
                    .checked_add(size)
                    .filter(|&end| end <= source.len())
                    .ok_or(DeltaError::CopyOutOfRange { offset, size })?;
                target.extend_from_slice(&source[offset..end]);
            }
            Op::Insert(data) => target.extend_from_slice(&data),
        }
    }

    if target.len() != target_size {
        return Err(DeltaError::SizeMismatch {
            expected: target_size,
            actual: target.len(),
        });
    }
    Ok(target)
}
