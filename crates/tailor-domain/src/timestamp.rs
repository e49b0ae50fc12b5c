use std::fmt;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Human readable layout of build versions.
pub const VERSION_FORMAT: &str = "YYYYMMDD.HHMMSS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("build timestamp '{0}' does not match {VERSION_FORMAT}")]
    Malformed(String),
    #[error("year {0} cannot be written as a four digit build version")]
    YearOutOfRange(i32),
    #[error("failed to format build timestamp: {0}")]
    Format(String),
}

/// A build version such as `20240105.093000`.
///
/// Versions order lexicographically in the same order as the instants they
/// name, which retention relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildTimestamp(String);

impl BuildTimestamp {
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let bytes = raw.as_bytes();
        let shaped = bytes.len() == 15
            && bytes[8] == b'.'
            && bytes
                .iter()
                .enumerate()
                .all(|(index, byte)| index == 8 || byte.is_ascii_digit());
        if !shaped {
            return Err(TimestampError::Malformed(raw.to_string()));
        }
        PrimitiveDateTime::parse(
            raw,
            format_description!("[year][month][day].[hour][minute][second]"),
        )
        .map_err(|_| TimestampError::Malformed(raw.to_string()))?;
        Ok(Self(raw.to_string()))
    }

    pub fn from_datetime(datetime: PrimitiveDateTime) -> Result<Self, TimestampError> {
        let year = datetime.year();
        if !(0..=9999).contains(&year) {
            return Err(TimestampError::YearOutOfRange(year));
        }
        datetime
            .format(format_description!(
                "[year][month][day].[hour][minute][second]"
            ))
            .map(Self)
            .map_err(|err| TimestampError::Format(err.to_string()))
    }

    /// Version for an instant, expressed in UTC.
    pub fn from_instant(instant: OffsetDateTime) -> Result<Self, TimestampError> {
        let utc = instant.to_offset(UtcOffset::UTC);
        Self::from_datetime(PrimitiveDateTime::new(utc.date(), utc.time()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for BuildTimestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_well_formed_versions() {
        let stamp = BuildTimestamp::parse("20231231.235959").expect("valid");
        assert_eq!(stamp.as_str(), "20231231.235959");
        assert_eq!(stamp.to_string(), "20231231.235959");
    }

    #[test]
    fn rejects_bad_shapes_and_impossible_dates() {
        for raw in [
            "",
            "2023123.235959",
            "20231231-235959",
            "20231231.23595a",
            "20231332.000000",
            "20230229.000000",
            "20231231.246000",
        ] {
            assert_eq!(
                BuildTimestamp::parse(raw),
                Err(TimestampError::Malformed(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn formats_instants_in_utc() {
        let stamp = BuildTimestamp::from_instant(datetime!(2024-01-05 10:30:00 +01:00))
            .expect("format");
        assert_eq!(stamp.as_str(), "20240105.093000");
    }

    #[test]
    fn years_outside_four_digits_are_rejected() {
        let at_year = |year: i32| {
            let date = time::Date::from_calendar_date(year, time::Month::January, 1).expect("date");
            PrimitiveDateTime::new(date, time::Time::MIDNIGHT)
        };
        assert_eq!(
            BuildTimestamp::from_datetime(at_year(-1)),
            Err(TimestampError::YearOutOfRange(-1))
        );
        let earliest = BuildTimestamp::from_datetime(at_year(0)).expect("year zero");
        assert_eq!(earliest.as_str(), "00000101.000000");
        assert_eq!(BuildTimestamp::parse(earliest.as_str()), Ok(earliest));
    }

    #[test]
    fn ordering_follows_time() {
        let older = BuildTimestamp::parse("20231231.235959").expect("older");
        let newer = BuildTimestamp::parse("20240101.000000").expect("newer");
        assert!(older < newer);
    }
}
