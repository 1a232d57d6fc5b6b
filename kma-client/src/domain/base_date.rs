use std::fmt;

use time::{OffsetDateTime, UtcOffset};

/// Calendar date in `YYYYMMDD` form, used as both `baseDate` and `fcstDate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseDate(String);

impl BaseDate {
    /// Local calendar date of `now` at the given fixed offset.
    pub fn from_instant(now: OffsetDateTime, offset: UtcOffset) -> Self {
        let date = now.to_offset(offset).date();
        Self(format!(
            "{:04}{:02}{:02}",
            date.year(),
            u8::from(date.month()),
            date.day()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
