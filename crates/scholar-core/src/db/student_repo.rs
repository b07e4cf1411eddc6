//! Student records.

use super::convert::{fmt_date, now_ts, parse_opt_date, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{NewStudent, Student, StudentUpdate};
use async_trait::async_trait;
use uuid::Uuid;

const TABLE: ScopedTable = ScopedTable {
    kind: ResourceKind::Student,
    columns: "id, school_id, class_id, first_name, last_name, admission_no, date_of_birth, \
              address, enrolled_on, created_at, updated_at",
    order_by: "last_name ASC, first_name ASC",
};

const DEPENDENTS: &[DependentRef] = &[
    ("attendance", "attendance", "student_id"),
    ("examResults", "exam_results", "student_id"),
    ("reportCards", "report_cards", "student_id"),
    ("submissions", "assignment_submissions", "student_id"),
    ("orders", "material_orders", "student_id"),
];

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_id: Option<Uuid>,
    /// Only children of this parent.
    pub parent_id: Option<Uuid>,
    pub search: Option<String>,
}

impl StudentFilter {
    fn rows(&self) -> RowFilter {
        let mut rows = RowFilter::new()
            .eq_opt("class_id", self.class_id)
            .search(
                &["first_name", "last_name", "admission_no"],
                self.search.as_deref(),
            );
        if let Some(parent_id) = self.parent_id {
            rows = rows.in_select(
                "id",
                "SELECT g.student_id FROM guardianships g WHERE g.parent_id = ",
                parent_id,
            );
        }
        rows
    }
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn create(&self, student: &NewStudent) -> Result<Student, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Student>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &StudentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Student>, DbError>;

    async fn update(&self, id: Uuid, update: &StudentUpdate) -> Result<Student, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;

    async fn admission_taken(
        &self,
        school_id: Uuid,
        admission_no: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError>;

    /// Students currently placed in the class.
    async fn class_enrolment(&self, class_id: Uuid) -> Result<u64, DbError>;

    /// Ids of the students placed in the class.
    async fn ids_in_class(&self, class_id: Uuid) -> Result<Vec<Uuid>, DbError>;
}

pub struct SqliteStudentRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteStudentRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StudentRepository for SqliteStudentRepository {
    async fn create(&self, student: &NewStudent) -> Result<Student, DbError> {
        let now = now_ts();
        let row: StudentRow = sqlx::query_as(&format!(
            "INSERT INTO students ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            TABLE.columns, TABLE.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(student.school_id.to_string())
        .bind(student.class_id.map(|id| id.to_string()))
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(student.admission_no.trim())
        .bind(student.date_of_birth.map(fmt_date))
        .bind(&student.address)
        .bind(student.enrolled_on.map(fmt_date))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Student>, DbError> {
        TABLE.find::<StudentRow, Student>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &StudentFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Student>, DbError> {
        TABLE
            .list::<StudentRow, Student>(&self.pool, predicate, &filter.rows(), pagination)
            .await
    }

    async fn update(&self, id: Uuid, update: &StudentUpdate) -> Result<Student, DbError> {
        let changes = Changes::new()
            .set_opt("class_id", update.class_id)
            .set_opt("first_name", update.first_name.clone())
            .set_opt("last_name", update.last_name.clone())
            .set_opt("admission_no", update.admission_no.as_deref().map(str::trim))
            .set_opt("date_of_birth", update.date_of_birth)
            .set_opt("address", update.address.clone());
        if !TABLE.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Student", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Student", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        TABLE.delete(&self.pool, id).await
    }

    async fn admission_taken(
        &self,
        school_id: Uuid,
        admission_no: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM students WHERE school_id = ? AND admission_no = ? AND id != ?",
        )
        .bind(school_id.to_string())
        .bind(admission_no.trim())
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn class_enrolment(&self, class_id: Uuid) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE class_id = ?")
            .bind(class_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn ids_in_class(&self, class_id: Uuid) -> Result<Vec<Uuid>, DbError> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM students WHERE class_id = ? ORDER BY id")
                .bind(class_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        ids.iter().map(|id| parse_uuid(id, "students.id")).collect()
    }
}

pub fn create_student_repository(pool: &DbPool) -> Box<dyn StudentRepository> {
    Box::new(SqliteStudentRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: String,
    school_id: String,
    class_id: Option<String>,
    first_name: String,
    last_name: String,
    admission_no: String,
    date_of_birth: Option<String>,
    address: Option<String>,
    enrolled_on: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StudentRow> for Student {
    type Error = DbError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(Student {
            id: parse_uuid(&row.id, "students.id")?,
            school_id: parse_uuid(&row.school_id, "students.school_id")?,
            class_id: parse_opt_uuid(row.class_id, "students.class_id")?,
            first_name: row.first_name,
            last_name: row.last_name,
            admission_no: row.admission_no,
            date_of_birth: parse_opt_date(row.date_of_birth)?,
            address: row.address,
            enrolled_on: parse_opt_date(row.enrolled_on)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}
