//! Domain models for schools and everything they own.
//!
//! Entity structs serialize with camelCase keys. Each family has a `New*`
//! input (no id or timestamps; the repository assigns those) and, where the
//! entity is editable, a `*Update` with every field optional.

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum stored
/// as lowercase text.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($ty), s)),
                }
            }
        }
    };
}

pub mod academics;
pub mod assessment;
pub mod attendance;
pub mod commerce;
pub mod event;
pub mod notification;
pub mod people;
pub mod school;

pub use academics::{
    AcademicYear, AcademicYearUpdate, Class, ClassUpdate, Grade, GradeUpdate, Lesson,
    LessonUpdate, NewAcademicYear, NewClass, NewGrade, NewLesson, NewSubject, NewTerm, Subject,
    SubjectUpdate, Term, TermUpdate,
};
pub use assessment::{
    Assignment, AssignmentUpdate, Exam, ExamQuestion, ExamResult, ExamUpdate, NewAssignment,
    NewExam, NewExamQuestion, NewReportCard, NewSubmission, ReportCard, ReportCardStatus,
    ResultEntry, Submission,
};
pub use attendance::{AttendanceMark, AttendanceRecord, AttendanceStatus};
pub use commerce::{Material, MaterialOrder, MaterialUpdate, NewMaterial, NewOrder, OrderStatus};
pub use event::{Event, EventUpdate, NewEvent};
pub use notification::{NewNotification, Notification, NotificationCategory};
pub use people::{
    Guardianship, NewParent, NewStudent, NewTeacher, Parent, ParentUpdate, Student,
    StudentUpdate, Teacher, TeacherUpdate,
};
pub use school::{NewSchool, School, SchoolUpdate, VerificationStatus};
