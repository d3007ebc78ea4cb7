use bstr::{BString, ByteSlice};
use git_utils::date::GitDate;

use crate::ObjectError;

/// Identity line of a commit: `Name <email> <secs> <+hhmm>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: BString,
    pub email: BString,
    pub time: GitDate,
}

impl Author {
    pub fn new(name: impl Into<BString>, email: impl Into<BString>, time: GitDate) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
        }
    }

    pub fn parse(line: &[u8]) -> Result<Self, ObjectError> {
        let invalid = || ObjectError::InvalidAuthor(BString::from(line));

        let open = line.find_byte(b'<').ok_or_else(invalid)?;
        let close = line[open..].find_byte(b'>').ok_or_else(invalid)? + open;

        let time = std::str::from_utf8(line[close + 1..].trim())
            .ok()
            .and_then(|raw| GitDate::parse_raw(raw).ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            name: BString::from(line[..open].trim()),
            email: BString::from(line[open + 1..close].trim()),
            time,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.name.len() + self.email.len() + 24);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(self.time.to_raw().as_bytes());
        out
    }

    pub fn short_date(&self) -> String {
        self.time.short_date()
    }

    pub fn readable_time(&self) -> String {
        self.time.readable()
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_bytes().as_bstr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exactly() {
        let line = b"A. U. Thor <author@example.com> 1234567890 -0500";
        let author = Author::parse(line).unwrap();
        assert_eq!(author.name, "A. U. Thor");
        assert_eq!(author.email, "author@example.com");
        assert_eq!(author.time, GitDate::new(1234567890, -300));
        assert_eq!(author.to_bytes(), line);
    }

    #[test]
    fn display_helpers() {
        let author = Author::new("A", "a@b", GitDate::new(1234567890, 0));
        assert_eq!(author.short_date(), "2009-02-13");
        assert_eq!(author.readable_time(), "Fri Feb 13 23:31:30 2009 +0000");
        assert_eq!(author.to_string(), "A <a@b> 1234567890 +0000");
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(Author::parse(b"nobody").is_err());
        assert!(Author::parse(b"x <y> notatime").is_err());
    }
}
