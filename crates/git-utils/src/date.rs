use chrono::{DateTime, FixedOffset, Local};

use crate::error::UtilError;
use crate::Result;

/// A point in time as git records it: unix seconds plus the author's
/// timezone offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GitDate {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Offset from UTC in minutes (e.g. -300 for UTC-05:00).
    pub tz_offset: i32,
}

impl GitDate {
    pub fn new(timestamp: i64, tz_offset: i32) -> Self {
        Self {
            timestamp,
            tz_offset,
        }
    }

    /// Current wall-clock time in the local timezone.
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            timestamp: now.timestamp(),
            tz_offset: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse the raw `"<secs> <+hhmm>"` form stored in commit headers.
    pub fn parse_raw(input: &str) -> Result<Self> {
        let (secs, zone) = input
            .trim()
            .split_once(' ')
            .ok_or_else(|| UtilError::DateParse(format!("missing timezone in '{input}'")))?;

        let timestamp = secs
            .parse::<i64>()
            .map_err(|_| UtilError::DateParse(format!("bad timestamp '{secs}'")))?;

        let bytes = zone.as_bytes();
        if bytes.len() != 5 || !matches!(bytes[0], b'+' | b'-') {
            return Err(UtilError::DateParse(format!("bad timezone '{zone}'")));
        }
        let digits: u32 = zone[1..]
            .parse()
            .map_err(|_| UtilError::DateParse(format!("bad timezone '{zone}'")))?;
        let minutes = (digits / 100 * 60 + digits % 100) as i32;
        let tz_offset = if bytes[0] == b'-' { -minutes } else { minutes };

        Ok(Self::new(timestamp, tz_offset))
    }

    /// `"<secs> <+hhmm>"`.
    pub fn to_raw(&self) -> String {
        format!("{} {}", self.timestamp, self.zone())
    }

    /// The offset in `+hhmm` form.
    pub fn zone(&self) -> String {
        let sign = if self.tz_offset < 0 { '-' } else { '+' };
        let abs = self.tz_offset.unsigned_abs();
        format!("{}{:02}{:02}", sign, abs / 60, abs % 60)
    }

    /// `YYYY-MM-DD` in the recorded timezone.
    pub fn short_date(&self) -> String {
        self.strftime("%Y-%m-%d")
    }

    /// `Thu Feb 13 23:31:30 2009 +0000`, as shown by log headers.
    pub fn readable(&self) -> String {
        self.strftime("%a %b %-d %H:%M:%S %Y %z")
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.tz_offset * 60)?;
        DateTime::from_timestamp(self.timestamp, 0).map(|dt| dt.with_timezone(&offset))
    }

    fn strftime(&self, fmt: &str) -> String {
        match self.to_datetime() {
            Some(dt) => dt.format(fmt).to_string(),
            None => self.to_raw(),
        }
    }
}
