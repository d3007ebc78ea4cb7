//! Buffered pack input that tracks its offset and running checksum.

use std::io::Read;

use flate2::{Decompress, FlushDecompress, Status};
use git_hash::hasher::Hasher;
use git_hash::ObjectId;

use crate::PackError;

const CHUNK_SIZE: usize = 64 * 1024;
/// Upper bound on the buffer reserved up front from a record's declared size.
const MAX_PREALLOC: usize = 1 << 20;

/// A pack byte source.
///
/// Bytes pulled through the stream advance [`offset`](Stream::offset) and
/// feed the digest, so after the last record the digest covers exactly the
/// bytes the trailer must match. [`capture`](Stream::capture) additionally
/// records the raw bytes of one record for CRC computation or passthrough.
pub struct Stream<R> {
    input: R,
    buffer: Vec<u8>,
    pos: usize,
    offset: u64,
    digest: Option<Hasher>,
    capture: Option<Vec<u8>>,
}

impl<R: Read> Stream<R> {
    pub fn new(input: R) -> Self {
        Self::with_prefix(input, Vec::new())
    }

    /// A stream whose first bytes were already read from `input` by a
    /// protocol layer.
    pub fn with_prefix(input: R, prefix: Vec<u8>) -> Self {
        Self {
            input,
            buffer: prefix,
            pos: 0,
            offset: 0,
            digest: Some(Hasher::new()),
            capture: None,
        }
    }

    /// A stream positioned at `offset` within a pack, for random access.
    /// It keeps no digest.
    pub fn at(input: R, offset: u64) -> Self {
        Self {
            input,
            buffer: Vec::new(),
            pos: 0,
            offset,
            digest: None,
            capture: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Run `f`, returning its result and every byte it consumed.
    pub fn capture<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PackError>,
    ) -> Result<(T, Vec<u8>), PackError> {
        self.capture = Some(Vec::new());
        let result = f(self);
        let raw = self.capture.take().unwrap_or_default();
        Ok((result?, raw))
    }

    pub fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>, PackError> {
        let mut out = vec![0u8; size];
        self.read_exact(&mut out).map_err(eof)?;
        Ok(out)
    }

    /// Inflate one zlib stream whose output must be exactly `size` bytes,
    /// consuming no input past its end.
    pub fn read_zlib(&mut self, size: usize) -> Result<Vec<u8>, PackError> {
        let start = self.offset;
        let mut inflater = Decompress::new(true);
        let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));

        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(CHUNK_SIZE);
            }
            let available = self.fill()?;
            if available.is_empty() {
                return Err(PackError::UnexpectedEof);
            }

            let (in_before, out_before) = (inflater.total_in(), out.len());
            let status = inflater
                .decompress_vec(available, &mut out, FlushDecompress::None)
                .map_err(|_| PackError::Corrupt(start))?;
            let consumed = (inflater.total_in() - in_before) as usize;
            self.consume(consumed);

            match status {
                Status::StreamEnd => break,
                _ if consumed == 0 && out.len() == out_before => {
                    return Err(PackError::Corrupt(start));
                }
                _ => {}
            }
        }

        if out.len() != size {
            return Err(PackError::Corrupt(start));
        }
        Ok(out)
    }

    /// Inflate only the first `limit` bytes of a zlib stream. The stream
    /// position afterwards is unspecified; use this for random-access
    /// header peeks only.
    pub fn peek_zlib(&mut self, limit: usize) -> Result<Vec<u8>, PackError> {
        let start = self.offset;
        let mut inflater = Decompress::new(true);
        let mut out = Vec::with_capacity(limit);

        while out.len() < limit {
            let available = self.fill()?;
            if available.is_empty() {
                break;
            }
            let (in_before, out_before) = (inflater.total_in(), out.len());
            let status = inflater
                .decompress_vec(available, &mut out, FlushDecompress::None)
                .map_err(|_| PackError::Corrupt(start))?;
            let consumed = (inflater.total_in() - in_before) as usize;
            self.consume(consumed);

            if status == Status::StreamEnd || (consumed == 0 && out.len() == out_before) {
                break;
            }
        }
        Ok(out)
    }

    /// Compare the 20-byte trailer against the digest of everything read so far.
    pub fn verify_checksum(&mut self) -> Result<ObjectId, PackError> {
        let actual = match self.digest.take() {
            Some(digest) => digest.finalize()?,
            None => ObjectId::NULL,
        };
        let mut trailer = [0u8; 20];
        let mut filled = 0;
        while filled < trailer.len() {
            let available = self.fill()?;
            if available.is_empty() {
                return Err(PackError::UnexpectedEof);
            }
            let n = available.len().min(trailer.len() - filled);
            trailer[filled..filled + n].copy_from_slice(&available[..n]);
            self.pos += n;
            self.offset += n as u64;
            filled += n;
        }

        let expected = ObjectId::from_raw(trailer);
        if expected != actual {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(actual)
    }

    /// Unconsumed buffered bytes, refilling from the input when empty.
    fn fill(&mut self) -> Result<&[u8], PackError> {
        if self.pos >= self.buffer.len() {
            self.buffer.resize(CHUNK_SIZE, 0);
            let n = loop {
                match self.input.read(&mut self.buffer) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            self.buffer.truncate(n);
            self.pos = 0;
        }
        Ok(&self.buffer[self.pos..])
    }

    fn consume(&mut self, n: usize) {
        let data = &self.buffer[self.pos..self.pos + n];
        if let Some(digest) = self.digest.as_mut() {
            digest.update(data);
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(data);
        }
        self.pos += n;
        self.offset += n as u64;
    }
}

impl<R: Read> Read for Stream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let available = self
            .fill()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

fn eof(err: std::io::Error) -> PackError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        PackError::UnexpectedEof
    } else {
        PackError::Io(err)
    }
}
