//! Fixtures for repository tests: an isolated migrated database per test and
//! helpers that seed the rows most tests need.

use super::{
    create_assignment_repository, create_calendar_repository, create_class_repository,
    create_exam_repository, create_grade_repository, create_parent_repository,
    create_pool_with_options, create_school_repository, create_student_repository,
    create_subject_repository, create_teacher_repository, create_timetable_repository,
    create_user_repository, run_migrations, DbPool, PoolOptions,
};
use crate::auth::{Role, User};
use crate::models::*;
use crate::schedule::ClockTime;
use chrono::NaiveDate;
use uuid::Uuid;

pub async fn test_pool() -> DbPool {
    let url = format!(
        "sqlite:file:repo_{}?mode=memory&cache=shared",
        Uuid::new_v4()
    );
    let pool = create_pool_with_options(&url, PoolOptions::single_connection())
        .await
        .expect("in-memory pool");
    run_migrations(&pool).await.expect("migrations");
    pool
}

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
}

pub fn time(value: &str) -> ClockTime {
    value.parse().expect("valid HH:MM")
}

pub fn new_school(name: &str, code: &str) -> NewSchool {
    NewSchool {
        name: name.to_string(),
        code: code.to_string(),
        email: None,
        phone: None,
        address: None,
        verification_status: VerificationStatus::Pending,
    }
}

/// An approved school.
pub async fn seed_school(pool: &DbPool, code: &str) -> School {
    let mut school = new_school(&format!("{} Academy", code), code);
    school.verification_status = VerificationStatus::Approved;
    create_school_repository(pool)
        .create(&school)
        .await
        .expect("seed school")
}

pub async fn seed_user(pool: &DbPool, school_id: Option<Uuid>, role: Role, email: &str) -> User {
    let user = User::new(email, "not-a-real-hash", "Test", "User", role, school_id);
    create_user_repository(pool)
        .create(&user)
        .await
        .expect("seed user")
}

pub async fn seed_teacher(pool: &DbPool, school_id: Uuid, email: &str) -> (Teacher, User) {
    create_teacher_repository(pool)
        .create_with_account(
            &NewTeacher {
                school_id,
                first_name: "Tess".into(),
                last_name: "Teacher".into(),
                email: email.into(),
                phone: None,
                qualification: None,
                hire_date: None,
            },
            "not-a-real-hash",
        )
        .await
        .expect("seed teacher")
}

pub async fn seed_parent(pool: &DbPool, school_id: Uuid, email: &str) -> (Parent, User) {
    create_parent_repository(pool)
        .create_with_account(
            &NewParent {
                school_id,
                first_name: "Pat".into(),
                last_name: "Parent".into(),
                email: email.into(),
                phone: None,
                address: None,
            },
            "not-a-real-hash",
        )
        .await
        .expect("seed parent")
}

/// A class under a fresh grade of its own.
pub async fn seed_class(
    pool: &DbPool,
    school_id: Uuid,
    name: &str,
    supervisor_id: Option<Uuid>,
) -> Class {
    let levels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM grades WHERE school_id = ?")
        .bind(school_id.to_string())
        .fetch_one(pool.inner())
        .await
        .expect("count grades");
    let grade = create_grade_repository(pool)
        .create(&NewGrade {
            school_id,
            level: levels + 1,
            name: format!("Grade {}", levels + 1),
            description: None,
        })
        .await
        .expect("seed grade");
    create_class_repository(pool)
        .create(&NewClass {
            school_id,
            grade_id: grade.id,
            supervisor_id,
            name: name.into(),
            capacity: 30,
        })
        .await
        .expect("seed class")
}

pub async fn seed_student(
    pool: &DbPool,
    school_id: Uuid,
    class_id: Option<Uuid>,
    admission_no: &str,
) -> Student {
    create_student_repository(pool)
        .create(&NewStudent {
            school_id,
            class_id,
            first_name: "Sam".into(),
            last_name: admission_no.into(),
            admission_no: admission_no.into(),
            date_of_birth: None,
            address: None,
            enrolled_on: None,
        })
        .await
        .expect("seed student")
}

pub async fn seed_subject(pool: &DbPool, school_id: Uuid, code: &str) -> Subject {
    create_subject_repository(pool)
        .create(&NewSubject {
            school_id,
            name: format!("{} studies", code),
            code: code.into(),
            description: None,
        })
        .await
        .expect("seed subject")
}

/// An active autumn term (2024-09-01..2024-12-20) in a 2024/25 year.
pub async fn seed_term(pool: &DbPool, school_id: Uuid) -> Term {
    let calendar = create_calendar_repository(pool);
    let year = calendar
        .create_year(&NewAcademicYear {
            school_id,
            name: "2024/25".into(),
            start_date: date("2024-09-01"),
            end_date: date("2025-08-31"),
            is_current: true,
        })
        .await
        .expect("seed year");
    calendar
        .create_term(&NewTerm {
            school_id,
            academic_year_id: year.id,
            name: "Autumn".into(),
            start_date: date("2024-09-01"),
            end_date: date("2024-12-20"),
            is_active: true,
        })
        .await
        .expect("seed term")
}

/// A 10:00-11:00 exam marked out of 100, pass mark 40.
pub async fn seed_exam(
    pool: &DbPool,
    class: &Class,
    subject_id: Uuid,
    term_id: Uuid,
    day: &str,
) -> Exam {
    create_exam_repository(pool)
        .create(&NewExam {
            school_id: class.school_id,
            term_id,
            class_id: class.id,
            subject_id,
            title: "Mid-term".into(),
            exam_date: date(day),
            start_time: time("10:00"),
            end_time: time("11:00"),
            total_marks: 100.0,
            passing_marks: 40.0,
        })
        .await
        .expect("seed exam")
}

pub async fn seed_lesson(
    pool: &DbPool,
    class: &Class,
    subject_id: Uuid,
    teacher_id: Uuid,
    day_of_week: u8,
    start: &str,
    end: &str,
) -> Lesson {
    create_timetable_repository(pool)
        .create(&NewLesson {
            school_id: class.school_id,
            class_id: class.id,
            subject_id,
            teacher_id,
            day_of_week,
            start_time: time(start),
            end_time: time(end),
            room: None,
        })
        .await
        .expect("seed lesson")
}

pub async fn seed_assignment(pool: &DbPool, class: &Class, subject_id: Uuid) -> Assignment {
    create_assignment_repository(pool)
        .create(&NewAssignment {
            school_id: class.school_id,
            class_id: class.id,
            subject_id,
            teacher_id: None,
            title: "Essay".into(),
            description: None,
            due_date: date("2024-10-31"),
            max_score: 10.0,
        })
        .await
        .expect("seed assignment")
}
