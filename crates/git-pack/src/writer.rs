use std::io::Write;

use bstr::BString;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_utils::progress::Progress;

use crate::compressor::{Compressor, WINDOW_SIZE};
use crate::entry::Entry;
use crate::numbers::VarIntLE;
use crate::{ObjectSource, PackError, SIGNATURE, VERSION};

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// zlib level, 0-9.
    pub compression: u32,
    /// Name delta bases by offset instead of object id.
    pub allow_ofs: bool,
    /// Search for deltas at all. Off, every object is stored whole.
    pub deltify: bool,
    /// Objects kept as delta source candidates, the target included.
    /// Below 2 no deltas are searched for.
    pub window: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default().level(),
            allow_ofs: false,
            deltify: true,
            window: WINDOW_SIZE,
        }
    }
}

/// Serializes objects into a pack on `output`.
pub struct Writer<W> {
    output: W,
    options: WriterOptions,
    digest: Hasher,
    offset: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(output: W, options: WriterOptions) -> Self {
        Self {
            output,
            options,
            digest: Hasher::new(),
            offset: 0,
        }
    }

    /// Write every `(oid, path)` as one pack, returning its checksum.
    ///
    /// Delta bases are always written before the deltas that use them.
    pub fn write_objects<I>(
        mut self,
        source: &impl ObjectSource,
        objects: I,
        progress: &mut Progress,
    ) -> Result<ObjectId, PackError>
    where
        I: IntoIterator<Item = (ObjectId, Option<BString>)>,
    {
        let mut entries = self.prepare_pack_list(source, objects, progress)?;
        if self.options.deltify && self.options.window > 1 {
            let mut compressor = Compressor::with_window(self.options.window);
            for index in 0..entries.len() {
                compressor.add(&entries, index);
            }
            compressor.build_deltas(&mut entries, source, progress)?;
        }

        self.write_header(entries.len() as u32)?;
        self.write_entries(&mut entries, source, progress)?;

        let checksum = std::mem::take(&mut self.digest).finalize()?;
        self.output.write_all(checksum.as_bytes())?;
        self.output.flush()?;
        tracing::debug!(objects = entries.len(), bytes = self.offset + 20, %checksum, "wrote pack");
        Ok(checksum)
    }

    fn prepare_pack_list<I>(
        &self,
        source: &impl ObjectSource,
        objects: I,
        progress: &mut Progress,
    ) -> Result<Vec<Entry>, PackError>
    where
        I: IntoIterator<Item = (ObjectId, Option<BString>)>,
    {
        progress.start("Counting objects", None);
        let mut entries = Vec::new();
        for (oid, path) in objects {
            let info = source.load_info(&oid)?;
            entries.push(Entry::new(oid, info, path, self.options.allow_ofs));
            progress.tick();
        }
        progress.stop();
        Ok(entries)
    }

    fn write_header(&mut self, count: u32) -> Result<(), PackError> {
        let mut header = Vec::with_capacity(crate::HEADER_SIZE);
        header.extend_from_slice(SIGNATURE);
        header.extend_from_slice(&VERSION.to_be_bytes());
        header.extend_from_slice(&count.to_be_bytes());
        self.write(&header)
    }

    fn write_entries(
        &mut self,
        entries: &mut [Entry],
        source: &impl ObjectSource,
        progress: &mut Progress,
    ) -> Result<(), PackError> {
        progress.start("Writing objects", Some(entries.len() as u64));
        for index in 0..entries.len() {
            self.write_entry(entries, source, index, progress)?;
        }
        progress.stop();
        Ok(())
    }

    fn write_entry(
        &mut self,
        entries: &mut [Entry],
        source: &impl ObjectSource,
        index: usize,
        progress: &mut Progress,
    ) -> Result<(), PackError> {
        if let Some(base) = entries[index].delta.as_ref().map(|d| d.base) {
            self.write_entry(entries, source, base, progress)?;
        }
        if entries[index].offset.is_some() {
            return Ok(());
        }
        entries[index].offset = Some(self.offset);

        let entry = &entries[index];
        let base = entry
            .delta
            .as_ref()
            .map(|d| (&entries[d.base].oid, entries[d.base].offset.unwrap_or(0)));

        let mut header = VarIntLE::write(entry.packed_size() as u64, 4);
        header[0] |= entry.packed_type() << 4;
        let prefix = entry.delta_prefix(base);

        let body = match &entry.delta {
            Some(delta) => deflate(&delta.data, self.options.compression)?,
            None => deflate(&source.load_raw(&entry.oid)?.data, self.options.compression)?,
        };

        self.write(&header)?;
        self.write(&prefix)?;
        self.write(&body)?;
        progress.tick();
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.output.write_all(data)?;
        self.digest.update(data);
        self.offset += data.len() as u64;
        Ok(())
    }
}

fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>, PackError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
