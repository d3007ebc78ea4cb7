//! Pkt-line framing and the capability handshake.
//!
//! Each packet is prefixed with its length as four hex digits, the prefix
//! included; `0000` is a flush packet ending a section. Text lines end with
//! a newline that the receiver strips.
//!
//! The first line each side sends carries its capabilities: after a space
//! for a fetch client's first `want`, after a NUL everywhere else. Four
//! bytes that are not a length header, such as the `PACK` signature that
//! starts an unframed pack, come back as [`Packet::Raw`].

use std::io::{Read, Write};

use crate::ProtocolError;

/// Maximum data per packet (65520 - 4 = 65516).
pub const MAX_PKT_DATA_LEN: usize = 65516;

/// A frame as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Vec<u8>),
    Flush,
    /// A four-byte head that is not a hex length.
    Unframed([u8; 4]),
}

pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn read_pkt(&mut self) -> Result<PktLine, ProtocolError> {
        let mut head = [0u8; 4];
        self.reader.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Protocol("unexpected EOF reading pkt-line length".into())
            } else {
                ProtocolError::Io(e)
            }
        })?;

        if !head.iter().all(u8::is_ascii_hexdigit) {
            return Ok(PktLine::Unframed(head));
        }
        let len = head
            .iter()
            .fold(0usize, |len, &b| len * 16 + (b as char).to_digit(16).unwrap_or(0) as usize);

        match len {
            0 => Ok(PktLine::Flush),
            1..=3 => Err(ProtocolError::InvalidPktLine(format!(
                "pkt-line length {len} is invalid"
            ))),
            _ => {
                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data)?;
                Ok(PktLine::Data(data))
            }
        }
    }
}

pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn write_line(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_PKT_DATA_LEN {
            return Err(ProtocolError::InvalidPktLine(format!(
                "data too long for pkt-line: {} bytes (max {})",
                data.len(),
                MAX_PKT_DATA_LEN
            )));
        }
        write!(self.writer, "{:04x}", data.len() + 4)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Write `text` followed by a newline.
    pub fn write_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
        self.write_line(&data)
    }

    pub fn write_flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.write_all(b"0000")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Which program this end of the connection is. It decides how
/// capabilities are attached to and found in the first line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Fetch,
    Push,
    UploadPack,
    ReceivePack,
}

/// A received packet, text lines without their newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Line(String),
    Flush,
    Raw([u8; 4]),
}

/// One end of a protocol exchange.
pub struct Connection<R, W> {
    role: Role,
    reader: PktLineReader<R>,
    writer: PktLineWriter<W>,
    local_caps: Vec<String>,
    remote_caps: Option<Vec<String>>,
    caps_sent: bool,
}

impl<R: Read, W: Write> Connection<R, W> {
    pub fn new(role: Role, input: R, output: W, capabilities: &[&str]) -> Self {
        Self {
            role,
            reader: PktLineReader::new(input),
            writer: PktLineWriter::new(output),
            local_caps: capabilities.iter().map(|cap| (*cap).to_owned()).collect(),
            remote_caps: None,
            caps_sent: false,
        }
    }

    /// Whether the other end announced `capability`.
    pub fn capable(&self, capability: &str) -> bool {
        self.remote_caps
            .as_ref()
            .is_some_and(|caps| caps.iter().any(|cap| cap == capability))
    }

    /// The raw input, for reading a pack that follows the pkt-lines.
    pub fn input(&mut self) -> &mut R {
        self.reader.inner_mut()
    }

    /// The raw output, for writing a pack.
    pub fn output(&mut self) -> &mut W {
        self.writer.inner_mut()
    }

    /// Send one line, or a flush packet for `None`.
    pub fn send_packet(&mut self, line: Option<&str>) -> Result<(), ProtocolError> {
        match line {
            Some(line) => {
                let line = self.append_caps(line);
                self.writer.write_text(&line)?;
            }
            None => self.writer.write_flush()?,
        }
        self.writer.flush()
    }

    fn append_caps(&mut self, line: &str) -> String {
        if self.caps_sent {
            return line.to_owned();
        }
        self.caps_sent = true;

        let separator = if self.role == Role::Fetch { ' ' } else { '\0' };
        let caps: Vec<&str> = self
            .local_caps
            .iter()
            .filter(|cap| self.remote_caps.is_none() || self.capable(cap))
            .map(String::as_str)
            .collect();
        format!("{line}{separator}{}", caps.join(" "))
    }

    pub fn recv_packet(&mut self) -> Result<Packet, ProtocolError> {
        match self.reader.read_pkt()? {
            PktLine::Flush => Ok(Packet::Flush),
            PktLine::Unframed(head) => Ok(Packet::Raw(head)),
            PktLine::Data(data) => {
                let mut line = String::from_utf8_lossy(&data).into_owned();
                if line.ends_with('\n') {
                    line.pop();
                }
                Ok(Packet::Line(self.detect_caps(line)))
            }
        }
    }

    /// The lines before `terminator`: a line (or raw head) equal to it, or
    /// a flush packet when `None`. Flushes are skipped while waiting for a
    /// text terminator.
    pub fn recv_until(&mut self, terminator: Option<&str>) -> Result<Vec<String>, ProtocolError> {
        let mut lines = Vec::new();
        loop {
            match (self.recv_packet()?, terminator) {
                (Packet::Flush, None) => return Ok(lines),
                (Packet::Flush, Some(_)) => {}
                (Packet::Line(line), Some(end)) if line == end => return Ok(lines),
                (Packet::Line(line), _) => lines.push(line),
                (Packet::Raw(head), Some(end)) if head == end.as_bytes() => return Ok(lines),
                (Packet::Raw(head), _) => {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "invalid pkt-line length: {:?}",
                        String::from_utf8_lossy(&head)
                    )))
                }
            }
        }
    }

    /// Split the other end's capabilities off its first line.
    fn detect_caps(&mut self, line: String) -> String {
        if self.remote_caps.is_some() {
            return line;
        }
        let (separator, parts) = if self.role == Role::UploadPack { (' ', 3) } else { ('\0', 2) };
        let mut fields: Vec<&str> = line.splitn(parts, separator).collect();
        let caps = if fields.len() == parts { fields.pop().unwrap_or_default() } else { "" };

        self.remote_caps = Some(caps.split(' ').filter(|cap| !cap.is_empty()).map(str::to_owned).collect());
        tracing::trace!(role = ?self.role, caps, "remote capabilities");
        fields.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn written(role: Role, caps: &[&str], lines: &[Option<&str>]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut conn = Connection::new(role, Cursor::new(Vec::new()), &mut buf, caps);
        for line in lines {
            conn.send_packet(*line).unwrap();
        }
        buf
    }

    #[test]
    fn length_prefix_counts_header_and_newline() {
        let buf = written(Role::UploadPack, &[], &[Some("hello"), None]);
        assert_eq!(&buf[..], b"000ahello\n0000");
    }

    #[test]
    fn first_line_carries_capabilities() {
        let buf = written(Role::ReceivePack, &["report-status", "ofs-delta"], &[Some("a"), Some("b")]);
        assert_eq!(&buf[..], b"001ea\0report-status ofs-delta\n0006b\n");

        let buf = written(Role::Fetch, &["ofs-delta"], &[Some("want x")]);
        assert_eq!(&buf[..], b"0015want x ofs-delta\n");
    }

    #[test]
    fn capabilities_narrow_to_what_the_remote_has() {
        let input = b"0017x refs/a\0ofs-delta\n0000".to_vec();
        let mut buf = Vec::new();
        let mut conn = Connection::new(Role::Push, Cursor::new(input), &mut buf, &["report-status", "ofs-delta"]);

        assert_eq!(conn.recv_until(None).unwrap(), vec!["x refs/a"]);
        assert!(conn.capable("ofs-delta"));
        assert!(!conn.capable("report-status"));

        conn.send_packet(Some("u")).unwrap();
        assert_eq!(&buf[..], b"0010u\0ofs-delta\n");
    }

    #[test]
    fn upload_pack_reads_capabilities_after_the_first_want() {
        let input = b"0017want abc ofs-delta\n000dwant def\n0000".to_vec();
        let mut conn = Connection::new(Role::UploadPack, Cursor::new(input), Vec::new(), &[]);
        assert_eq!(conn.recv_until(None).unwrap(), vec!["want abc", "want def"]);
        assert!(conn.capable("ofs-delta"));
    }

    #[test]
    fn recv_until_stops_at_an_unframed_signature() {
        let input = b"0008NAK\nPACK".to_vec();
        let mut conn = Connection::new(Role::Fetch, Cursor::new(input), Vec::new(), &[]);
        assert_eq!(conn.recv_until(Some("PACK")).unwrap(), vec!["NAK"]);
    }

    #[test]
    fn recv_until_rejects_unexpected_garbage() {
        let input = b"000ahello\nxyz!".to_vec();
        let mut conn = Connection::new(Role::Fetch, Cursor::new(input), Vec::new(), &[]);
        assert!(matches!(conn.recv_until(None), Err(ProtocolError::InvalidPktLine(_))));
    }

    #[test]
    fn reader_handles_empty_and_short_packets() {
        let mut reader = PktLineReader::new(Cursor::new(b"00040002".to_vec()));
        assert_eq!(reader.read_pkt().unwrap(), PktLine::Data(Vec::new()));
        assert!(reader.read_pkt().is_err());
    }

    #[test]
    fn eof_is_a_protocol_error() {
        let mut reader = PktLineReader::new(Cursor::new(b"00".to_vec()));
        assert!(matches!(reader.read_pkt(), Err(ProtocolError::Protocol(_))));
    }
}
