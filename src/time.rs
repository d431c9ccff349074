//! `StructTime`: a 9-field time tuple compared structurally, matching the
//! time representation the feed source normalises published/updated timestamps into.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// year, month, day, hour, minute, second, weekday (0 = Monday), yearday (1-based), isdst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: u32,
    pub yearday: u32,
    pub isdst: bool,
}

impl StructTime {
    /// Build from a UTC `DateTime`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            weekday: dt.weekday().num_days_from_monday(),
            yearday: dt.ordinal(),
            isdst: false,
        }
    }

    /// The current instant, UTC.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert back to a `DateTime<Utc>`, tolerating an invalid tuple by clamping
    /// to the epoch rather than panicking.
    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, self.second)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap())
    }

    /// Render as an RFC 5322 `Date:` header value: `%d %b %Y %H:%M:%S %z`,
    /// with `%z` fixed at `+0000` since every tuple here is UTC-assumed.
    pub fn to_rfc5322(self) -> String {
        self.to_datetime().format("%d %b %Y %H:%M:%S +0000").to_string()
    }
}
