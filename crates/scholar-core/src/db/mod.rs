//! Database layer for Scholar.
//!
//! Every school-owned table is read through a tenant [`Predicate`] so the
//! scoping decided in [`crate::access`] becomes part of each query.
//! Repositories follow one shape: an `async_trait` interface, a SQLite
//! implementation and a `create_*_repository` factory.
//!
//! [`Predicate`]: crate::access::Predicate

mod convert;
mod error;
mod pagination;
mod pool;
mod schema;
pub(crate) mod scope;

pub mod analytics_repo;
pub mod assignment_repo;
pub mod attendance_repo;
pub mod calendar_repo;
pub mod class_repo;
pub mod event_repo;
pub mod exam_repo;
pub mod material_repo;
pub mod notification_repo;
pub mod parent_repo;
pub mod report_card_repo;
pub mod school_repo;
pub mod seed;
pub mod student_repo;
pub mod subject_repo;
pub mod teacher_repo;
pub mod timetable_repo;
pub mod token_repo;
pub mod user_repo;

#[cfg(test)]
pub(crate) mod test_support;

pub use convert::{fmt_date, fmt_ts};
pub use error::DbError;
pub use pagination::{PageInfo, PaginatedResult, Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use pool::{
    create_pool, create_pool_with_options, escape_like_pattern, make_like_pattern, DbPool,
    PoolOptions,
};
pub use schema::run_migrations;
pub use scope::{Dependents, SqlValue};

pub use analytics_repo::{
    AnalyticsRepository, AttendanceCounts, AttendanceScope, ExamAverage, ExamScope,
    StudentFigures, SubjectAverage,
};
pub use assignment_repo::{AssignmentFilter, AssignmentRepository};
pub use attendance_repo::{AttendanceFilter, AttendanceRepository};
pub use calendar_repo::CalendarRepository;
pub use class_repo::{ClassFilter, ClassRepository, GradeRepository};
pub use event_repo::{EventFilter, EventRepository};
pub use exam_repo::{ExamFilter, ExamRepository};
pub use material_repo::{MaterialRepository, OrderFilter};
pub use notification_repo::NotificationRepository;
pub use parent_repo::{ParentFilter, ParentRepository};
pub use report_card_repo::{ReportCardFilter, ReportCardRepository};
pub use school_repo::{SchoolFilter, SchoolRepository};
pub use student_repo::{StudentFilter, StudentRepository};
pub use subject_repo::SubjectRepository;
pub use teacher_repo::{TeacherFilter, TeacherRepository};
pub use timetable_repo::{LessonFilter, SlotConflict, SlotRequest, TimetableRepository};
pub use token_repo::RefreshTokenRepository;
pub use user_repo::UserRepository;

pub use analytics_repo::create_analytics_repository;
pub use assignment_repo::create_assignment_repository;
pub use attendance_repo::create_attendance_repository;
pub use calendar_repo::create_calendar_repository;
pub use class_repo::{create_class_repository, create_grade_repository};
pub use event_repo::create_event_repository;
pub use exam_repo::create_exam_repository;
pub use material_repo::create_material_repository;
pub use notification_repo::create_notification_repository;
pub use parent_repo::create_parent_repository;
pub use report_card_repo::create_report_card_repository;
pub use school_repo::create_school_repository;
pub use student_repo::create_student_repository;
pub use subject_repo::create_subject_repository;
pub use teacher_repo::create_teacher_repository;
pub use timetable_repo::create_timetable_repository;
pub use token_repo::create_refresh_token_repository;
pub use user_repo::create_user_repository;

pub use seed::{ensure_super_admin, SeedError};
