use chrono::{
    offset::{LocalResult, TimeZone, Utc},
    DateTime, Timelike,
};
use std::fmt;
use winnow::{
    binary::{le_u16, le_u64},
    seq, PResult, Parser, Partial,
};

/// A timestamp in MS-DOS format
///
/// Represents dates from year 1980 to 2180, with 2 second precision.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct MsdosTimestamp {
    /// Time in 2-second intervals
    pub time: u16,

    /// Date in MS-DOS format, cf. <https://docs.microsoft.com/en-us/windows/win32/api/winbase/nf-winbase-dosdatetimetofiletime>
    pub date: u16,
}

impl fmt::Debug for MsdosTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "MsdosTimestamp({})", dt),
            None => write!(f, "MsdosTimestamp(?)"),
        }
    }
}

impl MsdosTimestamp {
    /// Parser for MS-DOS timestamps
    pub fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        seq! {Self {
            time: le_u16,
            date: le_u16,
        }}
        .parse_next(i)
    }

    /// Attempts to convert to a chrono UTC date time
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        // see https://docs.microsoft.com/en-us/windows/win32/api/winbase/nf-winbase-dosdatetimetofiletime
        let date = match {
            // bits 0-4: day of the month (1-31)
            let d = (self.date & 0b1_1111) as u32;
            // bits 5-8: month (1 = january, 2 = february and so on)
            let m = ((self.date >> 5) & 0b1111) as u32;
            // bits 9-15: year offset from 1980
            let y = ((self.date >> 9) + 1980) as i32;
            Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        } {
            LocalResult::Single(date) => date,
            _ => return None,
        };

        // bits 0-4: second divided by 2
        let s = (self.time & 0b1_1111) as u32 * 2;
        // bits 5-10: minute (0-59)
        let m = (self.time >> 5 & 0b11_1111) as u32;
        // bits 11-15: hour (0-23 on a 24-hour clock)
        let h = (self.time >> 11) as u32;
        date.with_hour(h)?.with_minute(m)?.with_second(s)
    }

    /// Packs a UTC date/time into MS-DOS format, clamping to the
    /// representable range (1980-01-01 .. 2107-12-31) and rounding the
    /// seconds down to the nearest even number (2-second resolution).
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        use chrono::Datelike;

        let year = dt.year().clamp(1980, 2107);
        let date = (((year - 1980) as u16) << 9)
            | ((dt.month() as u16) << 5)
            | (dt.day() as u16);
        let time = ((dt.hour() as u16) << 11)
            | ((dt.minute() as u16) << 5)
            | ((dt.second() as u16) / 2);
        Self { time, date }
    }

    /// Encodes as the 4 little-endian bytes stored in local/central headers
    /// (time word followed by date word).
    pub fn to_bytes(self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[..2].copy_from_slice(&self.time.to_le_bytes());
        out[2..].copy_from_slice(&self.date.to_le_bytes());
        out
    }
}

/// A timestamp in NTFS format.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct NtfsTimestamp {
    /// Timestamp in 100ns intervals since 1601-01-01 00:00:00 UTC
    pub timestamp: u64,
}

impl fmt::Debug for NtfsTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "NtfsTimestamp({})", dt),
            None => write!(f, "NtfsTimestamp(?)"),
        }
    }
}

impl NtfsTimestamp {
    /// Parse an MS-DOS timestamp from a byte slice
    pub fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        le_u64.map(|timestamp| Self { timestamp }).parse_next(i)
    }

    /// Attempts to convert to a chrono UTC date time
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        // windows timestamp resolution
        let ticks_per_second = 10_000_000;
        let secs = (self.timestamp / ticks_per_second) as i64;
        let nsecs = ((self.timestamp % ticks_per_second) * 100) as u32;
        let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single()?;
        match Utc.timestamp_opt(epoch.timestamp() + secs, nsecs) {
            LocalResult::Single(date) => Some(date),
            _ => None,
        }
    }
}

impl NtfsTimestamp {
    /// Packs a UTC date/time into 100ns ticks since the NTFS epoch
    /// (1601-01-01), for writing an NTFS extra field attribute.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let epoch = Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).single().unwrap();
        let delta = dt.signed_duration_since(epoch);
        let ticks = delta.num_nanoseconds().unwrap_or(0) / 100;
        Self {
            timestamp: ticks.max(0) as u64,
        }
    }
}

pub(crate) fn zero_datetime() -> chrono::DateTime<chrono::offset::Utc> {
    chrono::DateTime::from_naive_utc_and_offset(
        chrono::naive::NaiveDateTime::from_timestamp_opt(0, 0).unwrap(),
        chrono::offset::Utc,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn dos_time_round_trips_at_two_second_resolution() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 14, 15, 9, 26).single().unwrap();
        let packed = MsdosTimestamp::from_datetime(dt);
        let back = packed.to_datetime().unwrap();
        assert_eq!(back.year(), 2024);
        assert_eq!(back.month(), 3);
        assert_eq!(back.day(), 14);
        assert_eq!(back.hour(), 15);
        assert_eq!(back.minute(), 9);
        // odd seconds are truncated down to the nearest even number
        assert_eq!(back.second(), 26);
    }

    #[test]
    fn dos_time_rounds_odd_seconds_down() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 27).single().unwrap();
        let packed = MsdosTimestamp::from_datetime(dt);
        assert_eq!(packed.to_datetime().unwrap().second(), 26);
    }

    #[test]
    fn dos_time_clamps_below_1980() {
        let dt = Utc.with_ymd_and_hms(1970, 6, 1, 0, 0, 0).single().unwrap();
        let packed = MsdosTimestamp::from_datetime(dt);
        assert_eq!(packed.to_datetime().unwrap().year(), 1980);
    }

    #[test]
    fn ntfs_timestamp_round_trips() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 14, 15, 9, 26).single().unwrap();
        let ticks = NtfsTimestamp::from_datetime(dt);
        let back = ticks.to_datetime().unwrap();
        assert_eq!(back.timestamp(), dt.timestamp());
    }
}
