//! Year levels (grades) and the classes grouped under them.

use super::convert::{now_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::scope::{count_dependents, Changes, Dependents, DependentRef, RowFilter, ScopedTable};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::access::{Predicate, ResourceKind};
use crate::models::{Class, ClassUpdate, Grade, GradeUpdate, NewClass, NewGrade};
use async_trait::async_trait;
use uuid::Uuid;

const GRADES: ScopedTable = ScopedTable {
    kind: ResourceKind::Grade,
    columns: "id, school_id, level, name, description, created_at, updated_at",
    order_by: "level ASC",
};

const CLASSES: ScopedTable = ScopedTable {
    kind: ResourceKind::Class,
    columns: "id, school_id, grade_id, supervisor_id, name, capacity, created_at, updated_at",
    order_by: "name ASC",
};

const GRADE_DEPENDENTS: &[DependentRef] = &[("classes", "classes", "grade_id")];

const CLASS_DEPENDENTS: &[DependentRef] = &[
    ("students", "students", "class_id"),
    ("lessons", "lessons", "class_id"),
    ("exams", "exams", "class_id"),
    ("assignments", "assignments", "class_id"),
    ("attendance", "attendance", "class_id"),
    ("events", "events", "class_id"),
];

#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    pub grade_id: Option<Uuid>,
    pub supervisor_id: Option<Uuid>,
    pub search: Option<String>,
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn create(&self, grade: &NewGrade) -> Result<Grade, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Grade>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Grade>, DbError>;

    async fn level_taken(
        &self,
        school_id: Uuid,
        level: i64,
        except: Option<Uuid>,
    ) -> Result<bool, DbError>;

    async fn update(&self, id: Uuid, update: &GradeUpdate) -> Result<Grade, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

#[async_trait]
pub trait ClassRepository: Send + Sync {
    async fn create(&self, class: &NewClass) -> Result<Class, DbError>;

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Class>, DbError>;

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ClassFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Class>, DbError>;

    async fn name_taken(
        &self,
        school_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError>;

    async fn update(&self, id: Uuid, update: &ClassUpdate) -> Result<Class, DbError>;

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError>;

    async fn delete(&self, id: Uuid) -> Result<bool, DbError>;
}

pub struct SqliteGradeRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteGradeRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradeRepository for SqliteGradeRepository {
    async fn create(&self, grade: &NewGrade) -> Result<Grade, DbError> {
        let now = now_ts();
        let row: GradeRow = sqlx::query_as(&format!(
            "INSERT INTO grades ({}) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            GRADES.columns, GRADES.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(grade.school_id.to_string())
        .bind(grade.level)
        .bind(&grade.name)
        .bind(&grade.description)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Grade>, DbError> {
        GRADES.find::<GradeRow, Grade>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Grade>, DbError> {
        GRADES
            .list::<GradeRow, Grade>(&self.pool, predicate, &RowFilter::new(), pagination)
            .await
    }

    async fn level_taken(
        &self,
        school_id: Uuid,
        level: i64,
        except: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM grades WHERE school_id = ? AND level = ? AND id != ?",
        )
        .bind(school_id.to_string())
        .bind(level)
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn update(&self, id: Uuid, update: &GradeUpdate) -> Result<Grade, DbError> {
        let changes = Changes::new()
            .set_opt("level", update.level)
            .set_opt("name", update.name.clone())
            .set_opt("description", update.description.clone());
        if !GRADES.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Grade", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Grade", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, GRADE_DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        GRADES.delete(&self.pool, id).await
    }
}

pub struct SqliteClassRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteClassRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClassRepository for SqliteClassRepository {
    async fn create(&self, class: &NewClass) -> Result<Class, DbError> {
        let now = now_ts();
        let row: ClassRow = sqlx::query_as(&format!(
            "INSERT INTO classes ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            CLASSES.columns, CLASSES.columns
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(class.school_id.to_string())
        .bind(class.grade_id.to_string())
        .bind(class.supervisor_id.map(|id| id.to_string()))
        .bind(class.name.trim())
        .bind(class.capacity)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find(&self, predicate: &Predicate, id: Uuid) -> Result<Option<Class>, DbError> {
        CLASSES.find::<ClassRow, Class>(&self.pool, predicate, id).await
    }

    async fn list(
        &self,
        predicate: &Predicate,
        filter: &ClassFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Class>, DbError> {
        let rows = RowFilter::new()
            .eq_opt("grade_id", filter.grade_id)
            .eq_opt("supervisor_id", filter.supervisor_id)
            .search(&["name"], filter.search.as_deref());
        CLASSES
            .list::<ClassRow, Class>(&self.pool, predicate, &rows, pagination)
            .await
    }

    async fn name_taken(
        &self,
        school_id: Uuid,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classes WHERE school_id = ? AND name = ? AND id != ?",
        )
        .bind(school_id.to_string())
        .bind(name.trim())
        .bind(except.map(|id| id.to_string()).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn update(&self, id: Uuid, update: &ClassUpdate) -> Result<Class, DbError> {
        let changes = Changes::new()
            .set_opt("grade_id", update.grade_id)
            .set_opt("supervisor_id", update.supervisor_id)
            .set_opt("name", update.name.as_deref().map(str::trim))
            .set_opt("capacity", update.capacity);
        if !CLASSES.update(&self.pool, id, changes).await? {
            return Err(DbError::not_found("Class", id));
        }
        self.find(&Predicate::Unrestricted, id)
            .await?
            .ok_or_else(|| DbError::not_found("Class", id))
    }

    async fn dependents(&self, id: Uuid) -> Result<Dependents, DbError> {
        count_dependents(&self.pool, id, CLASS_DEPENDENTS).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        CLASSES.delete(&self.pool, id).await
    }
}

pub fn create_grade_repository(pool: &DbPool) -> Box<dyn GradeRepository> {
    Box::new(SqliteGradeRepository::new(pool.inner().clone()))
}

pub fn create_class_repository(pool: &DbPool) -> Box<dyn ClassRepository> {
    Box::new(SqliteClassRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct GradeRow {
    id: String,
    school_id: String,
    level: i64,
    name: String,
    description: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<GradeRow> for Grade {
    type Error = DbError;

    fn try_from(row: GradeRow) -> Result<Self, Self::Error> {
        Ok(Grade {
            id: parse_uuid(&row.id, "grades.id")?,
            school_id: parse_uuid(&row.school_id, "grades.school_id")?,
            level: row.level,
            name: row.name,
            description: row.description,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClassRow {
    id: String,
    school_id: String,
    grade_id: String,
    supervisor_id: Option<String>,
    name: String,
    capacity: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ClassRow> for Class {
    type Error = DbError;

    fn try_from(row: ClassRow) -> Result<Self, Self::Error> {
        Ok(Class {
            id: parse_uuid(&row.id, "classes.id")?,
            school_id: parse_uuid(&row.school_id, "classes.school_id")?,
            grade_id: parse_uuid(&row.grade_id, "classes.grade_id")?,
            supervisor_id: parse_opt_uuid(row.supervisor_id, "classes.supervisor_id")?,
            name: row.name,
            capacity: row.capacity,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Relationship;
    use crate::db::test_support::{
        date, seed_class, seed_school, seed_student, seed_teacher, test_pool,
    };
    use crate::db::{
        create_attendance_repository, create_student_repository, AttendanceRepository,
        StudentRepository,
    };
    use crate::models::{AttendanceMark, AttendanceStatus, StudentUpdate};

    #[tokio::test]
    async fn test_grade_level_unique_per_school() {
        let pool = test_pool().await;
        let a = seed_school(&pool, "GLA").await;
        let b = seed_school(&pool, "GLB").await;
        let repo = create_grade_repository(&pool);

        let g7 = repo
            .create(&NewGrade {
                school_id: a.id,
                level: 7,
                name: "Grade 7".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(repo.level_taken(a.id, 7, None).await.unwrap());
        assert!(!repo.level_taken(a.id, 7, Some(g7.id)).await.unwrap());
        assert!(!repo.level_taken(b.id, 7, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_class_blocks_grade_delete() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "GDEL").await;
        let class = seed_class(&pool, school.id, "9A", None).await;

        let grades = create_grade_repository(&pool);
        let deps = grades.dependents(class.grade_id).await.unwrap();
        assert_eq!(deps.get("classes"), Some(1));

        let classes = create_class_repository(&pool);
        seed_student(&pool, school.id, Some(class.id), "GD-1").await;
        let deps = classes.dependents(class.id).await.unwrap();
        assert_eq!(deps.get("students"), Some(1));
        assert_eq!(deps.get("lessons"), Some(0));
    }

    #[tokio::test]
    async fn test_attendance_history_blocks_delete_after_transfer() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "HIST").await;
        let old = seed_class(&pool, school.id, "7A", None).await;
        let new = seed_class(&pool, school.id, "7B", None).await;
        let student = seed_student(&pool, school.id, Some(old.id), "H-1").await;

        create_attendance_repository(&pool)
            .mark(
                &old,
                date("2024-09-02"),
                &[AttendanceMark {
                    student_id: student.id,
                    status: AttendanceStatus::Present,
                    remarks: None,
                }],
                None,
            )
            .await
            .unwrap();
        create_student_repository(&pool)
            .update(
                student.id,
                &StudentUpdate {
                    class_id: Some(new.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let classes = create_class_repository(&pool);
        let deps = classes.dependents(old.id).await.unwrap();
        assert_eq!(deps.get("students"), Some(0));
        assert_eq!(deps.get("attendance"), Some(1));
        assert!(!deps.is_clear());

        // The schema refuses the delete even if the count is skipped.
        assert!(classes.delete(old.id).await.is_err());
        assert!(classes.find(&Predicate::Unrestricted, old.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_teacher_lists_own_classes() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "CLT").await;
        let (teacher, _) = seed_teacher(&pool, school.id, "t@clt.test").await;
        let mine = seed_class(&pool, school.id, "10A", Some(teacher.id)).await;
        seed_class(&pool, school.id, "10B", None).await;

        let page = create_class_repository(&pool)
            .list(
                &Predicate::Related {
                    school_id: school.id,
                    relationship: Relationship::Teaches {
                        teacher_id: teacher.id,
                    },
                },
                &ClassFilter::default(),
                &Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, mine.id);
    }

    #[tokio::test]
    async fn test_update_renames_class() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "REN").await;
        let class = seed_class(&pool, school.id, "11A", None).await;
        let repo = create_class_repository(&pool);

        let updated = repo
            .update(
                class.id,
                &ClassUpdate {
                    name: Some(" 11B ".into()),
                    capacity: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "11B");
        assert_eq!(updated.capacity, 40);
        assert!(repo.name_taken(school.id, "11B", None).await.unwrap());
        assert!(repo.update(Uuid::new_v4(), &ClassUpdate::default()).await.is_err());
    }
}
