//! Derived classifications used by report cards and analytics.
//!
//! All thresholds are inclusive lower bounds on a 0–100 percentage.

use serde::{Deserialize, Serialize};
use std::fmt;

const BANDS: [(f64, &str, f64); 7] = [
    (90.0, "A+", 4.0),
    (80.0, "A", 3.5),
    (70.0, "B+", 3.0),
    (60.0, "B", 2.5),
    (50.0, "C+", 2.0),
    (40.0, "C", 1.5),
    (30.0, "D", 1.0),
];

/// Letter grade for a percentage.
pub fn grade_for(percentage: f64) -> &'static str {
    BANDS
        .iter()
        .find(|(floor, _, _)| percentage >= *floor)
        .map(|(_, grade, _)| *grade)
        .unwrap_or("F")
}

/// Grade point for a percentage.
pub fn gpa_for(percentage: f64) -> f64 {
    BANDS
        .iter()
        .find(|(floor, _, _)| percentage >= *floor)
        .map(|(_, _, gpa)| *gpa)
        .unwrap_or(0.0)
}

/// Every letter grade, best first.
pub fn grade_labels() -> impl Iterator<Item = &'static str> {
    BANDS.iter().map(|(_, grade, _)| *grade).chain(["F"])
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole × 100` as a two-decimal string; `"0.00"` when `whole` is 0.
pub fn rate(part: u64, whole: u64) -> String {
    format!("{:.2}", rate_value(part, whole))
}

/// Numeric form of [`rate`].
pub fn rate_value(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Percentage of `obtained` over `total`; zero when `total` is not positive.
pub fn percentage(obtained: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    round2(obtained / total * 100.0)
}

/// Struggling-student classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "Low Risk")]
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High Risk",
            RiskLevel::Medium => "Medium Risk",
            RiskLevel::Low => "Low Risk",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High when both average and attendance are poor, medium when either is.
pub fn risk_level(average_score: f64, attendance_rate: f64) -> RiskLevel {
    if average_score < 40.0 && attendance_rate < 70.0 {
        RiskLevel::High
    } else if average_score < 50.0 || attendance_rate < 80.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_lower_bounds_are_inclusive() {
        let cases = [
            (90.0, "A+", 4.0),
            (89.99, "A", 3.5),
            (80.0, "A", 3.5),
            (70.0, "B+", 3.0),
            (60.0, "B", 2.5),
            (50.0, "C+", 2.0),
            (40.0, "C", 1.5),
            (30.0, "D", 1.0),
            (29.99, "F", 0.0),
            (0.0, "F", 0.0),
            (100.0, "A+", 4.0),
        ];
        for (p, grade, gpa) in cases {
            assert_eq!(grade_for(p), grade, "grade for {}", p);
            assert_eq!(gpa_for(p), gpa, "gpa for {}", p);
        }
    }

    #[test]
    fn test_rate_guards_zero_denominator() {
        assert_eq!(rate(0, 0), "0.00");
        assert_eq!(rate(5, 0), "0.00");
        assert_eq!(rate(1, 3), "33.33");
        assert_eq!(rate(2, 3), "66.67");
        assert_eq!(rate(4, 4), "100.00");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(45.0, 60.0), 75.0);
        assert_eq!(percentage(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(risk_level(35.0, 60.0), RiskLevel::High);
        assert_eq!(risk_level(35.0, 90.0), RiskLevel::Medium);
        assert_eq!(risk_level(75.0, 75.0), RiskLevel::Medium);
        assert_eq!(risk_level(49.99, 85.0), RiskLevel::Medium);
        assert_eq!(risk_level(50.0, 80.0), RiskLevel::Low);
        assert_eq!(
            serde_json::to_string(&RiskLevel::High).unwrap(),
            "\"High Risk\""
        );
    }

    #[test]
    fn test_grade_labels() {
        let labels: Vec<_> = grade_labels().collect();
        assert_eq!(labels, vec!["A+", "A", "B+", "B", "C+", "C", "D", "F"]);
    }
}
