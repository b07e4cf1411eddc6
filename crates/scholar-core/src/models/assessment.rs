use crate::schedule::ClockTime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An exam session for one class and subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: Uuid,
    pub school_id: Uuid,
    pub term_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub exam_date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub total_marks: f64,
    pub passing_marks: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExam {
    pub school_id: Uuid,
    pub term_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub exam_date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub total_marks: f64,
    pub passing_marks: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ExamUpdate {
    pub title: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    pub total_marks: Option<f64>,
    pub passing_marks: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestion {
    pub id: Uuid,
    pub school_id: Uuid,
    pub exam_id: Uuid,
    pub subject_id: Uuid,
    pub prompt: String,
    pub marks: f64,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExamQuestion {
    pub prompt: String,
    pub marks: f64,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub id: Uuid,
    pub school_id: Uuid,
    pub exam_id: Uuid,
    pub student_id: Uuid,
    pub marks_obtained: f64,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of a bulk result upload.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub student_id: Uuid,
    pub marks_obtained: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: Uuid,
    pub school_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub max_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub school_id: Uuid,
    pub class_id: Uuid,
    pub subject_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: NaiveDate,
    pub max_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub school_id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub content: Option<String>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub student_id: Uuid,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCardStatus {
    Draft,
    Published,
}

text_enum!(ReportCardStatus {
    Draft => "draft",
    Published => "published",
});

/// A student's term summary, computed from exam results and attendance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: Uuid,
    pub school_id: Uuid,
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub average_percentage: f64,
    pub grade: String,
    pub gpa: f64,
    pub attendance_rate: String,
    pub remarks: Option<String>,
    pub status: ReportCardStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Computed figures for a draft report card.
#[derive(Debug, Clone)]
pub struct NewReportCard {
    pub school_id: Uuid,
    pub student_id: Uuid,
    pub term_id: Uuid,
    pub average_percentage: f64,
    pub grade: String,
    pub gpa: f64,
    pub attendance_rate: String,
    pub remarks: Option<String>,
}
