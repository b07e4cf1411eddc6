//! Clock times and range overlap for timetables, exams and terms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Two closed ranges `[a, b]` and `[c, d]` overlap iff `a <= d && c <= b`.
///
/// Touching endpoints count as an overlap.
pub fn ranges_overlap<T: PartialOrd>(a: &T, b: &T, c: &T, d: &T) -> bool {
    a <= d && c <= b
}

/// A wall-clock time of day with minute precision, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid time '{}', expected HH:MM", s);
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u16 = hour.parse().map_err(|_| invalid())?;
        let minute: u16 = minute.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_overlap_is_inclusive() {
        assert!(ranges_overlap(&1, &5, &5, &9));
        assert!(ranges_overlap(&3, &4, &1, &9));
        assert!(!ranges_overlap(&1, &4, &5, &9));
        assert!(!ranges_overlap(&6, &9, &1, &5));
    }

    #[test]
    fn test_term_dates_overlap() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert!(ranges_overlap(
            &d(2024, 9, 1),
            &d(2025, 6, 30),
            &d(2025, 1, 1),
            &d(2025, 1, 15)
        ));
        assert!(!ranges_overlap(
            &d(2024, 9, 1),
            &d(2024, 12, 20),
            &d(2025, 1, 6),
            &d(2025, 3, 28)
        ));
    }

    #[test]
    fn test_clock_time_parse() {
        let t: ClockTime = "08:30".parse().unwrap();
        assert_eq!(t.minutes(), 510);
        assert_eq!(t.to_string(), "08:30");
        assert!("8:30".parse::<ClockTime>().is_err());
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
        assert!("09:00".parse::<ClockTime>().unwrap() < "10:15".parse().unwrap());
    }

    #[test]
    fn test_clock_time_serde() {
        let t: ClockTime = serde_json::from_str("\"13:05\"").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"13:05\"");
        assert!(serde_json::from_str::<ClockTime>("\"1305\"").is_err());
    }
}
