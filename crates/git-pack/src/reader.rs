use std::io::Read;

use git_hash::ObjectId;
use git_object::{ObjectInfo, RawObject};

use crate::numbers::{VarIntBE, VarIntLE};
use crate::stream::Stream;
use crate::{delta, object_type, PackError, HEADER_SIZE, OFS_DELTA, REF_DELTA, SIGNATURE, VERSION};

/// One pack record as stored, before delta resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Object(RawObject),
    /// Delta against the record `base_ofs` bytes before this one.
    OfsDelta { base_ofs: u64, delta_data: Vec<u8> },
    /// Delta against an object named by id.
    RefDelta { base_oid: ObjectId, delta_data: Vec<u8> },
}

/// What a record header says about its object, without inflating the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordInfo {
    Object(ObjectInfo),
    /// `size` is the delta's declared target size.
    OfsDelta { base_ofs: u64, size: usize },
    RefDelta { base_oid: ObjectId, size: usize },
}

/// Parses a pack from a [`Stream`].
pub struct Reader<R> {
    stream: Stream<R>,
    count: u32,
}

impl<R: Read> Reader<R> {
    pub fn new(stream: Stream<R>) -> Self {
        Self { stream, count: 0 }
    }

    /// Number of records announced by the header.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn stream(&mut self) -> &mut Stream<R> {
        &mut self.stream
    }

    pub fn into_stream(self) -> Stream<R> {
        self.stream
    }

    pub fn read_header(&mut self) -> Result<u32, PackError> {
        let data = self.stream.read_bytes(HEADER_SIZE)?;
        let word = |i: usize| u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        if &data[0..4] != SIGNATURE {
            let mut sig = [0u8; 4];
            sig.copy_from_slice(&data[0..4]);
            return Err(PackError::BadSignature(sig));
        }
        let version = word(4);
        if version != VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        self.count = word(8);
        Ok(self.count)
    }

    pub fn read_record(&mut self) -> Result<Record, PackError> {
        parse_record(&mut self.stream)
    }

    /// Read one record, also returning its raw bytes as they appear in the pack.
    pub fn capture_record(&mut self) -> Result<(Record, Vec<u8>), PackError> {
        self.stream.capture(parse_record)
    }

    /// Parse a record header, inflating at most the delta size header.
    pub fn read_info(&mut self) -> Result<RecordInfo, PackError> {
        let offset = self.stream.offset();
        let (type_code, size) = read_record_header(&mut self.stream)?;

        match type_code {
            OFS_DELTA => {
                let base_ofs = VarIntBE::read(&mut self.stream)?;
                let size = self.delta_target_size()?;
                Ok(RecordInfo::OfsDelta { base_ofs, size })
            }
            REF_DELTA => {
                let base_oid = read_oid(&mut self.stream)?;
                let size = self.delta_target_size()?;
                Ok(RecordInfo::RefDelta { base_oid, size })
            }
            code => {
                let kind = object_type(code).ok_or(PackError::InvalidType { type_code: code, offset })?;
                Ok(RecordInfo::Object(ObjectInfo { kind, size }))
            }
        }
    }

    fn delta_target_size(&mut self) -> Result<usize, PackError> {
        // Two 64-bit varints fit in 20 bytes.
        let head = self.stream.peek_zlib(20)?;
        let (_, target) = delta::read_sizes(&mut head.as_slice())?;
        Ok(target)
    }
}

fn parse_record<R: Read>(stream: &mut Stream<R>) -> Result<Record, PackError> {
    let offset = stream.offset();
    let (type_code, size) = read_record_header(stream)?;

    match type_code {
        OFS_DELTA => {
            let base_ofs = VarIntBE::read(stream)?;
            let delta_data = stream.read_zlib(size)?;
            Ok(Record::OfsDelta { base_ofs, delta_data })
        }
        REF_DELTA => {
            let base_oid = read_oid(stream)?;
            let delta_data = stream.read_zlib(size)?;
            Ok(Record::RefDelta { base_oid, delta_data })
        }
        code => {
            let kind = object_type(code).ok_or(PackError::InvalidType { type_code: code, offset })?;
            let data = stream.read_zlib(size)?;
            Ok(Record::Object(RawObject::new(kind, data)))
        }
    }
}

fn read_record_header(stream: &mut impl Read) -> Result<(u8, usize), PackError> {
    let (byte, size) = VarIntLE::read(stream, 4)?;
    Ok(((byte >> 4) & 7, size as usize))
}

fn read_oid(stream: &mut impl Read) -> Result<ObjectId, PackError> {
    let mut raw = [0u8; 20];
    stream.read_exact(&mut raw).map_err(|_| PackError::UnexpectedEof)?;
    Ok(ObjectId::from_raw(raw))
}
