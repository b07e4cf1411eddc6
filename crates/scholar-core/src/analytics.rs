//! Aggregate snapshots for dashboards and analytics pages.
//!
//! A snapshot is recomputed on every request from several independent read
//! queries, each scoped by the caller's predicate for the table it reads.
//! The branches run concurrently and one failing branch fails the snapshot;
//! an empty branch contributes zeros.
//!
//! Payload fields are snake_case.

use crate::access::{resolve_filter, Identity, Predicate, ResourceKind};
use crate::db::scope::{count_visible, RowFilter};
use crate::db::{
    create_analytics_repository, create_assignment_repository, create_class_repository,
    create_notification_repository, create_student_repository, AnalyticsRepository,
    AssignmentRepository, AttendanceCounts, AttendanceScope, ClassRepository, DbError, DbPool,
    ExamScope, NotificationRepository, StudentRepository,
};
use crate::grading::{
    gpa_for, grade_for, grade_labels, rate, rate_value, risk_level, round2, RiskLevel,
};
use crate::models::{NewReportCard, Student, Term};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Days covered by the dashboard attendance figure, today included.
pub const DASHBOARD_ATTENDANCE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub present: u64,
    pub total: u64,
    /// Present share in percent with two decimals; `"0.00"` without records.
    pub attendance_rate: String,
}

impl From<AttendanceCounts> for AttendanceSummary {
    fn from(counts: AttendanceCounts) -> Self {
        Self {
            present: counts.present,
            total: counts.total,
            attendance_rate: rate(counts.present, counts.total),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamSummary {
    pub average_percentage: f64,
    /// Band of the average; absent when there are no results.
    pub grade: Option<&'static str>,
    pub results: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub students: u64,
    pub teachers: u64,
    pub classes: u64,
    pub subjects: u64,
    pub upcoming_exams: u64,
    pub open_assignments: u64,
    pub upcoming_events: u64,
    pub unread_notifications: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub role: &'static str,
    pub counts: DashboardCounts,
    pub attendance: AttendanceSummary,
    pub exams: ExamSummary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectPerformance {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub average_percentage: f64,
    pub grade: &'static str,
    pub results: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentAnalytics {
    pub student_id: Uuid,
    pub name: String,
    pub class_id: Option<Uuid>,
    pub average_percentage: f64,
    pub grade: &'static str,
    pub gpa: f64,
    pub exam_results: u64,
    pub attendance: AttendanceSummary,
    pub attendance_rate: String,
    pub risk_level: RiskLevel,
    pub subjects: Vec<SubjectPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrugglingStudent {
    pub student_id: Uuid,
    pub name: String,
    pub average_percentage: f64,
    pub attendance_rate: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAnalytics {
    pub class_id: Uuid,
    pub name: String,
    pub capacity: i64,
    pub enrolment: u64,
    pub average_percentage: f64,
    pub attendance_rate: String,
    /// Students per grade band of their exam average; students without
    /// results are left out.
    pub grade_distribution: BTreeMap<&'static str, u64>,
    pub struggling_students: Vec<StrugglingStudent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentAnalytics {
    pub assignment_id: Uuid,
    pub title: String,
    pub submissions: u64,
    /// Students currently placed in the assignment's class.
    pub expected: u64,
    pub submission_rate: String,
}

/// Builds aggregate snapshots for one caller at a time.
#[derive(Clone)]
pub struct AnalyticsComposer {
    pool: DbPool,
    analytics: Arc<dyn AnalyticsRepository>,
    students: Arc<dyn StudentRepository>,
    classes: Arc<dyn ClassRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl AnalyticsComposer {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            pool: pool.clone(),
            analytics: Arc::from(create_analytics_repository(pool)),
            students: Arc::from(create_student_repository(pool)),
            classes: Arc::from(create_class_repository(pool)),
            assignments: Arc::from(create_assignment_repository(pool)),
            notifications: Arc::from(create_notification_repository(pool)),
        }
    }

    async fn count(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        kind: ResourceKind,
        filter: RowFilter,
    ) -> Result<u64, DbError> {
        let predicate = resolve_filter(identity, kind, narrowing);
        count_visible(self.pool.inner(), kind, &predicate, &filter).await
    }

    pub async fn dashboard(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
    ) -> Result<Dashboard, DbError> {
        self.dashboard_at(identity, narrowing, Utc::now()).await
    }

    /// Dashboard as of `now`; "upcoming" and "open" are relative to it.
    pub async fn dashboard_at(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Dashboard, DbError> {
        let today = now.date_naive();
        let attendance_predicate = resolve_filter(identity, ResourceKind::Attendance, narrowing);
        let result_predicate = resolve_filter(identity, ResourceKind::ExamResult, narrowing);
        let attendance_scope = AttendanceScope {
            from: Some(today - Duration::days(DASHBOARD_ATTENDANCE_DAYS - 1)),
            to: Some(today),
            ..Default::default()
        };
        let exam_scope = ExamScope::default();

        let (
            students,
            teachers,
            classes,
            subjects,
            upcoming_exams,
            open_assignments,
            upcoming_events,
            unread_notifications,
            attendance,
            exams,
        ) = tokio::try_join!(
            self.count(identity, narrowing, ResourceKind::Student, RowFilter::new()),
            self.count(identity, narrowing, ResourceKind::Teacher, RowFilter::new()),
            self.count(identity, narrowing, ResourceKind::Class, RowFilter::new()),
            self.count(identity, narrowing, ResourceKind::Subject, RowFilter::new()),
            self.count(
                identity,
                narrowing,
                ResourceKind::Exam,
                RowFilter::new().gte_opt("exam_date", Some(today)),
            ),
            self.count(
                identity,
                narrowing,
                ResourceKind::Assignment,
                RowFilter::new().gte_opt("due_date", Some(today)),
            ),
            self.count(
                identity,
                narrowing,
                ResourceKind::Event,
                RowFilter::new().gte_opt("start_at", Some(now)),
            ),
            self.notifications.unread_count(identity.id),
            self.analytics
                .attendance_counts(&attendance_predicate, &attendance_scope),
            self.analytics.exam_average(&result_predicate, &exam_scope),
        )?;

        debug!(user_id = %identity.id, role = identity.role_name(), "Dashboard composed");

        Ok(Dashboard {
            role: identity.role_name(),
            counts: DashboardCounts {
                students,
                teachers,
                classes,
                subjects,
                upcoming_exams,
                open_assignments,
                upcoming_events,
                unread_notifications,
            },
            attendance: attendance.into(),
            exams: ExamSummary {
                average_percentage: round2(exams.average.unwrap_or(0.0)),
                grade: exams.average.map(grade_for),
                results: exams.results,
            },
            generated_at: now,
        })
    }

    /// `None` when the student is not visible to the caller.
    pub async fn student(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        student_id: Uuid,
    ) -> Result<Option<StudentAnalytics>, DbError> {
        let predicate = resolve_filter(identity, ResourceKind::Student, narrowing);
        let Some(student) = self.students.find(&predicate, student_id).await? else {
            return Ok(None);
        };

        let attendance_predicate = resolve_filter(identity, ResourceKind::Attendance, narrowing);
        let result_predicate = resolve_filter(identity, ResourceKind::ExamResult, narrowing);
        let exam_scope = ExamScope {
            student_id: Some(student.id),
            ..Default::default()
        };
        let attendance_scope = AttendanceScope {
            student_id: Some(student.id),
            ..Default::default()
        };

        let (average, attendance, subjects) = tokio::try_join!(
            self.analytics.exam_average(&result_predicate, &exam_scope),
            self.analytics
                .attendance_counts(&attendance_predicate, &attendance_scope),
            self.analytics.subject_averages(&result_predicate, &exam_scope),
        )?;

        let average_percentage = round2(average.average.unwrap_or(0.0));
        let attendance_value = rate_value(attendance.present, attendance.total);
        let attendance: AttendanceSummary = attendance.into();

        Ok(Some(StudentAnalytics {
            student_id: student.id,
            name: student.full_name(),
            class_id: student.class_id,
            average_percentage,
            grade: grade_for(average_percentage),
            gpa: gpa_for(average_percentage),
            exam_results: average.results,
            attendance_rate: attendance.attendance_rate.clone(),
            attendance,
            risk_level: risk_level(average_percentage, attendance_value),
            subjects: subjects
                .into_iter()
                .map(|s| {
                    let average_percentage = round2(s.average);
                    SubjectPerformance {
                        subject_id: s.subject_id,
                        subject_name: s.subject_name,
                        average_percentage,
                        grade: grade_for(average_percentage),
                        results: s.results,
                    }
                })
                .collect(),
        }))
    }

    /// `None` when the class is not visible to the caller.
    pub async fn class(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        class_id: Uuid,
    ) -> Result<Option<ClassAnalytics>, DbError> {
        let predicate = resolve_filter(identity, ResourceKind::Class, narrowing);
        let Some(class) = self.classes.find(&predicate, class_id).await? else {
            return Ok(None);
        };

        let student_predicate = resolve_filter(identity, ResourceKind::Student, narrowing);
        let attendance_predicate = resolve_filter(identity, ResourceKind::Attendance, narrowing);
        let result_predicate = resolve_filter(identity, ResourceKind::ExamResult, narrowing);
        let exam_scope = ExamScope {
            class_id: Some(class.id),
            ..Default::default()
        };
        let attendance_scope = AttendanceScope {
            class_id: Some(class.id),
            ..Default::default()
        };

        let (enrolment, average, attendance, figures) = tokio::try_join!(
            self.students.class_enrolment(class.id),
            self.analytics.exam_average(&result_predicate, &exam_scope),
            self.analytics
                .attendance_counts(&attendance_predicate, &attendance_scope),
            self.analytics
                .class_student_figures(&student_predicate, class.id),
        )?;

        let mut grade_distribution: BTreeMap<&'static str, u64> =
            grade_labels().map(|label| (label, 0)).collect();
        let mut struggling_students = Vec::new();

        for student in figures {
            if let Some(avg) = student.average {
                *grade_distribution.entry(grade_for(avg)).or_default() += 1;
            }
            // Nothing recorded yet: no basis for a classification.
            if student.average.is_none() && student.attendance.total == 0 {
                continue;
            }
            let average_percentage = round2(student.average.unwrap_or(0.0));
            let level = risk_level(
                average_percentage,
                rate_value(student.attendance.present, student.attendance.total),
            );
            if level != RiskLevel::Low {
                struggling_students.push(StrugglingStudent {
                    student_id: student.student_id,
                    name: student.name,
                    average_percentage,
                    attendance_rate: rate(student.attendance.present, student.attendance.total),
                    risk_level: level,
                });
            }
        }

        Ok(Some(ClassAnalytics {
            class_id: class.id,
            name: class.name,
            capacity: class.capacity,
            enrolment,
            average_percentage: round2(average.average.unwrap_or(0.0)),
            attendance_rate: rate(attendance.present, attendance.total),
            grade_distribution,
            struggling_students,
        }))
    }

    /// Attendance counts for a student, a class or the caller's whole scope.
    pub async fn attendance(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        scope: &AttendanceScope,
    ) -> Result<AttendanceSummary, DbError> {
        let predicate = resolve_filter(identity, ResourceKind::Attendance, narrowing);
        let counts = self.analytics.attendance_counts(&predicate, scope).await?;
        Ok(counts.into())
    }

    /// `None` when the assignment is not visible to the caller.
    pub async fn assignment(
        &self,
        identity: &Identity,
        narrowing: Option<Uuid>,
        assignment_id: Uuid,
    ) -> Result<Option<AssignmentAnalytics>, DbError> {
        let predicate = resolve_filter(identity, ResourceKind::Assignment, narrowing);
        let Some(assignment) = self.assignments.find(&predicate, assignment_id).await? else {
            return Ok(None);
        };

        let (submissions, expected) = tokio::try_join!(
            self.analytics.submission_count(assignment.id),
            self.students.class_enrolment(assignment.class_id),
        )?;

        Ok(Some(AssignmentAnalytics {
            assignment_id: assignment.id,
            title: assignment.title,
            submissions,
            expected,
            submission_rate: rate(submissions, expected),
        }))
    }

    /// Figures for a student's report card over one term.
    ///
    /// Results count when their exam belongs to the term; attendance counts
    /// when it falls between the term's start and end dates.
    pub async fn report_card(
        &self,
        student: &Student,
        term: &Term,
    ) -> Result<NewReportCard, DbError> {
        let predicate = Predicate::Tenant {
            school_id: student.school_id,
        };
        let exam_scope = ExamScope {
            student_id: Some(student.id),
            term_id: Some(term.id),
            ..Default::default()
        };
        let attendance_scope = AttendanceScope {
            student_id: Some(student.id),
            from: Some(term.start_date),
            to: Some(term.end_date),
            ..Default::default()
        };

        let (average, attendance) = tokio::try_join!(
            self.analytics.exam_average(&predicate, &exam_scope),
            self.analytics.attendance_counts(&predicate, &attendance_scope),
        )?;

        let average_percentage = round2(average.average.unwrap_or(0.0));
        Ok(NewReportCard {
            school_id: student.school_id,
            student_id: student.id,
            term_id: term.id,
            average_percentage,
            grade: grade_for(average_percentage).to_string(),
            gpa: gpa_for(average_percentage),
            attendance_rate: rate(attendance.present, attendance.total),
            remarks: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::test_support::{
        date, seed_assignment, seed_class, seed_exam, seed_school, seed_student, seed_subject,
        seed_teacher, seed_term, test_pool,
    };
    use crate::db::{create_attendance_repository, create_exam_repository};
    use crate::models::{AttendanceMark, AttendanceStatus, ResultEntry};

    fn admin(school_id: Uuid) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role: Some(Role::SchoolAdmin),
            school_id: Some(school_id),
            teacher_id: None,
            parent_id: None,
            student_id: None,
        }
    }

    #[tokio::test]
    async fn test_attendance_without_records_is_zero_rate() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "ANZ").await;
        let student = seed_student(&pool, school.id, None, "ANZ-1").await;
        let composer = AnalyticsComposer::new(&pool);

        let scope = AttendanceScope {
            student_id: Some(student.id),
            class_id: None,
            from: Some(date("2024-09-01")),
            to: Some(date("2024-09-30")),
        };
        let summary = composer.attendance(&admin(school.id), None, &scope).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.attendance_rate, "0.00");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["attendance_rate"], "0.00");
    }

    #[tokio::test]
    async fn test_student_and_class_figures() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "ANS").await;
        let class = seed_class(&pool, school.id, "5A", None).await;
        let strong = seed_student(&pool, school.id, Some(class.id), "ANS-1").await;
        let weak = seed_student(&pool, school.id, Some(class.id), "ANS-2").await;
        let subject = seed_subject(&pool, school.id, "MATH").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-10-10").await;

        create_exam_repository(&pool)
            .upsert_results(
                &exam,
                &[
                    ResultEntry {
                        student_id: strong.id,
                        marks_obtained: 90.0,
                        remarks: None,
                    },
                    ResultEntry {
                        student_id: weak.id,
                        marks_obtained: 35.0,
                        remarks: None,
                    },
                ],
            )
            .await
            .unwrap();
        create_attendance_repository(&pool)
            .mark(
                &class,
                date("2024-10-01"),
                &[
                    AttendanceMark {
                        student_id: strong.id,
                        status: AttendanceStatus::Present,
                        remarks: None,
                    },
                    AttendanceMark {
                        student_id: weak.id,
                        status: AttendanceStatus::Absent,
                        remarks: None,
                    },
                ],
                None,
            )
            .await
            .unwrap();

        let composer = AnalyticsComposer::new(&pool);
        let caller = admin(school.id);

        let figures = composer.student(&caller, None, strong.id).await.unwrap().unwrap();
        assert_eq!(figures.average_percentage, 90.0);
        assert_eq!(figures.grade, "A+");
        assert_eq!(figures.gpa, 4.0);
        assert_eq!(figures.attendance_rate, "100.00");
        assert_eq!(figures.risk_level, RiskLevel::Low);
        assert_eq!(figures.subjects.len(), 1);

        let class_view = composer.class(&caller, None, class.id).await.unwrap().unwrap();
        assert_eq!(class_view.enrolment, 2);
        assert_eq!(class_view.average_percentage, 62.5);
        assert_eq!(class_view.attendance_rate, "50.00");
        assert_eq!(class_view.grade_distribution["A+"], 1);
        assert_eq!(class_view.grade_distribution["D"], 1);
        assert_eq!(class_view.struggling_students.len(), 1);
        assert_eq!(class_view.struggling_students[0].student_id, weak.id);
        assert_eq!(class_view.struggling_students[0].risk_level, RiskLevel::High);
    }

    #[tokio::test]
    async fn test_snapshots_hide_other_tenants() {
        let pool = test_pool().await;
        let mine = seed_school(&pool, "ANM").await;
        let other = seed_school(&pool, "ANO").await;
        seed_student(&pool, mine.id, None, "ANM-1").await;
        seed_student(&pool, other.id, None, "ANO-1").await;
        seed_student(&pool, other.id, None, "ANO-2").await;
        let foreign = seed_student(&pool, other.id, None, "ANO-3").await;
        let composer = AnalyticsComposer::new(&pool);

        let dashboard = composer
            .dashboard_at(&admin(mine.id), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(dashboard.counts.students, 1);
        assert_eq!(dashboard.exams.grade, None);
        assert_eq!(dashboard.attendance.attendance_rate, "0.00");

        assert!(composer
            .student(&admin(mine.id), None, foreign.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_dashboard_fails_closed_for_unknown_role() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "ANF").await;
        seed_student(&pool, school.id, None, "ANF-1").await;
        let composer = AnalyticsComposer::new(&pool);

        let mut caller = admin(school.id);
        caller.role = None;
        let dashboard = composer.dashboard(&caller, None).await.unwrap();
        assert_eq!(dashboard.counts, DashboardCounts::default());
        assert_eq!(dashboard.role, "unknown");
    }

    #[tokio::test]
    async fn test_assignment_submission_rate() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "ANA").await;
        let (teacher, _) = seed_teacher(&pool, school.id, "t@ana.test").await;
        let class = seed_class(&pool, school.id, "6A", Some(teacher.id)).await;
        let subject = seed_subject(&pool, school.id, "ENG").await;
        let assignment = seed_assignment(&pool, &class, subject.id).await;
        let composer = AnalyticsComposer::new(&pool);

        let empty = composer
            .assignment(&admin(school.id), None, assignment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(empty.expected, 0);
        assert_eq!(empty.submission_rate, "0.00");

        seed_student(&pool, school.id, Some(class.id), "ANA-1").await;
        let one = composer
            .assignment(&admin(school.id), None, assignment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one.expected, 1);
        assert_eq!(one.submissions, 0);
    }

    #[tokio::test]
    async fn test_report_card_uses_term_window() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "ANR").await;
        let class = seed_class(&pool, school.id, "7A", None).await;
        let student = seed_student(&pool, school.id, Some(class.id), "ANR-1").await;
        let subject = seed_subject(&pool, school.id, "SCI").await;
        let term = seed_term(&pool, school.id).await;
        let exam = seed_exam(&pool, &class, subject.id, term.id, "2024-11-05").await;

        create_exam_repository(&pool)
            .upsert_results(
                &exam,
                &[ResultEntry {
                    student_id: student.id,
                    marks_obtained: 72.0,
                    remarks: None,
                }],
            )
            .await
            .unwrap();
        let attendance = create_attendance_repository(&pool);
        for (day, status) in [
            ("2024-10-01", AttendanceStatus::Present),
            ("2024-10-02", AttendanceStatus::Absent),
            // After the term ends; not counted.
            ("2025-01-10", AttendanceStatus::Absent),
        ] {
            attendance
                .mark(
                    &class,
                    date(day),
                    &[AttendanceMark {
                        student_id: student.id,
                        status,
                        remarks: None,
                    }],
                    None,
                )
                .await
                .unwrap();
        }

        let card = AnalyticsComposer::new(&pool)
            .report_card(&student, &term)
            .await
            .unwrap();
        assert_eq!(card.average_percentage, 72.0);
        assert_eq!(card.grade, "B+");
        assert_eq!(card.gpa, 3.0);
        assert_eq!(card.attendance_rate, "50.00");
    }
}
