use serde::Serialize;

/// How a resource's rows hang off the school graph.
///
/// Teachers reach rows through classes; parents reach rows through the
/// students they are guardian of. The anchor names the column that leads to
/// that edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Owned by the school only (years, subjects, events...).
    School,
    /// The row is a class.
    ClassSelf,
    /// The row belongs to the class in this column.
    Class(&'static str),
    /// The row is a student.
    StudentSelf,
    /// The row belongs to the student in this column.
    Student(&'static str),
}

/// Every tenant-scoped entity family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    School,
    User,
    Teacher,
    Parent,
    Student,
    Grade,
    Class,
    Subject,
    AcademicYear,
    Term,
    Lesson,
    Exam,
    ExamQuestion,
    ExamResult,
    Assignment,
    Submission,
    Attendance,
    ReportCard,
    Material,
    MaterialOrder,
    Event,
}

impl ResourceKind {
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::School => "schools",
            ResourceKind::User => "users",
            ResourceKind::Teacher => "teachers",
            ResourceKind::Parent => "parents",
            ResourceKind::Student => "students",
            ResourceKind::Grade => "grades",
            ResourceKind::Class => "classes",
            ResourceKind::Subject => "subjects",
            ResourceKind::AcademicYear => "academic_years",
            ResourceKind::Term => "terms",
            ResourceKind::Lesson => "lessons",
            ResourceKind::Exam => "exams",
            ResourceKind::ExamQuestion => "exam_questions",
            ResourceKind::ExamResult => "exam_results",
            ResourceKind::Assignment => "assignments",
            ResourceKind::Submission => "assignment_submissions",
            ResourceKind::Attendance => "attendance",
            ResourceKind::ReportCard => "report_cards",
            ResourceKind::Material => "materials",
            ResourceKind::MaterialOrder => "material_orders",
            ResourceKind::Event => "events",
        }
    }

    /// Column holding the owning school's id.
    pub fn tenant_column(&self) -> &'static str {
        match self {
            ResourceKind::School => "id",
            _ => "school_id",
        }
    }

    pub fn anchor(&self) -> Anchor {
        match self {
            ResourceKind::Class => Anchor::ClassSelf,
            ResourceKind::Lesson | ResourceKind::Exam | ResourceKind::Assignment => {
                Anchor::Class("class_id")
            }
            ResourceKind::Student => Anchor::StudentSelf,
            ResourceKind::ExamResult
            | ResourceKind::Submission
            | ResourceKind::Attendance
            | ResourceKind::ReportCard
            | ResourceKind::MaterialOrder => Anchor::Student("student_id"),
            ResourceKind::School
            | ResourceKind::User
            | ResourceKind::Teacher
            | ResourceKind::Parent
            | ResourceKind::Grade
            | ResourceKind::Subject
            | ResourceKind::AcademicYear
            | ResourceKind::Term
            | ResourceKind::ExamQuestion
            | ResourceKind::Material
            | ResourceKind::Event => Anchor::School,
        }
    }

    /// Human-readable entity name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::School => "School",
            ResourceKind::User => "User",
            ResourceKind::Teacher => "Teacher",
            ResourceKind::Parent => "Parent",
            ResourceKind::Student => "Student",
            ResourceKind::Grade => "Grade",
            ResourceKind::Class => "Class",
            ResourceKind::Subject => "Subject",
            ResourceKind::AcademicYear => "Academic year",
            ResourceKind::Term => "Term",
            ResourceKind::Lesson => "Timetable entry",
            ResourceKind::Exam => "Exam",
            ResourceKind::ExamQuestion => "Exam question",
            ResourceKind::ExamResult => "Exam result",
            ResourceKind::Assignment => "Assignment",
            ResourceKind::Submission => "Submission",
            ResourceKind::Attendance => "Attendance record",
            ResourceKind::ReportCard => "Report card",
            ResourceKind::Material => "Material",
            ResourceKind::MaterialOrder => "Order",
            ResourceKind::Event => "Event",
        }
    }
}
