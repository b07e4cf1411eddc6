//! Conversions between stored column values and domain types.
//!
//! Identifiers are stored as hyphenated UUID text, instants as RFC 3339 text
//! in UTC with second precision, and calendar dates as `YYYY-MM-DD`.

use super::DbError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value)
        .map_err(|e| DbError::Serialization(format!("Invalid UUID in {}: {}", column, e)))
}

pub(crate) fn parse_opt_uuid(value: Option<String>, column: &str) -> Result<Option<Uuid>, DbError> {
    value.map(|v| parse_uuid(&v, column)).transpose()
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("Invalid timestamp: {}", e)))
}

pub(crate) fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    value.map(|v| parse_ts(&v)).transpose()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DbError::Serialization(format!("Invalid date {}: {}", value, e)))
}

pub(crate) fn parse_opt_date(value: Option<String>) -> Result<Option<NaiveDate>, DbError> {
    value.map(|v| parse_date(&v)).transpose()
}

pub(crate) fn parse_enum<T: FromStr>(value: &str, column: &str) -> Result<T, DbError> {
    value
        .parse::<T>()
        .map_err(|_| DbError::Serialization(format!("Invalid {}: {}", column, value)))
}

/// Formats an instant the way every timestamp column stores it.
pub fn fmt_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Formats a calendar date the way every date column stores it.
pub fn fmt_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Current instant in storage format.
pub(crate) fn now_ts() -> String {
    fmt_ts(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = fmt_ts(Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap());
        let later = fmt_ts(Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap());
        assert_eq!(earlier, "2024-09-01T08:00:00Z");
        assert!(earlier < later);
        assert_eq!(parse_ts(&earlier).unwrap().to_rfc3339(), "2024-09-01T08:00:00+00:00");
    }

    #[test]
    fn test_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(parse_date(&fmt_date(date)).unwrap(), date);
        assert!(parse_date("15/01/2025").is_err());
    }

    #[test]
    fn test_invalid_uuid_is_serialization_error() {
        assert!(matches!(
            parse_uuid("nope", "student_id"),
            Err(DbError::Serialization(_))
        ));
    }
}
