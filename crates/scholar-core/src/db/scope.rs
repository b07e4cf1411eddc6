//! Tenant-scoped query composition.
//!
//! [`push_predicate`] is the only place a [`Predicate`] becomes SQL. Every
//! value is bound through [`QueryBuilder::push_bind`]; only static table and
//! column names are ever written into the query text.

use super::convert::{fmt_date, fmt_ts, now_ts};
use super::{DbError, PaginatedResult, Pagination};
use crate::access::{Anchor, Predicate, Relationship, ResourceKind};
use crate::schedule::ClockTime;
use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

/// A bindable column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Real(f64),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Text(fmt_date(v))
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Text(fmt_ts(v))
    }
}

impl From<ClockTime> for SqlValue {
    fn from(v: ClockTime) -> Self {
        SqlValue::Text(v.to_string())
    }
}

pub(crate) fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: SqlValue) {
    match value {
        SqlValue::Text(v) => qb.push_bind(v),
        SqlValue::Int(v) => qb.push_bind(v),
        SqlValue::Real(v) => qb.push_bind(v),
        SqlValue::Null => qb.push_bind(Option::<String>::None),
    };
}

fn column(alias: &str, name: &str) -> String {
    if alias.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", alias, name)
    }
}

/// Appends ` AND <predicate>` for rows of `kind`.
pub fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, kind: ResourceKind, predicate: &Predicate) {
    push_predicate_on(qb, kind, predicate, "")
}

/// Like [`push_predicate`] with columns qualified by `alias`.
pub fn push_predicate_on(
    qb: &mut QueryBuilder<'_, Sqlite>,
    kind: ResourceKind,
    predicate: &Predicate,
    alias: &str,
) {
    let tenant = column(alias, kind.tenant_column());
    match predicate {
        Predicate::Unrestricted => {}
        Predicate::FailClosed => {
            qb.push(" AND 1 = 0");
        }
        Predicate::Tenant { school_id } => {
            qb.push(format!(" AND {} = ", tenant))
                .push_bind(school_id.to_string());
        }
        Predicate::Related {
            school_id,
            relationship,
        } => {
            qb.push(format!(" AND {} = ", tenant))
                .push_bind(school_id.to_string());
            push_relationship(qb, kind.anchor(), *relationship, alias, &tenant);
        }
    }
}

fn push_relationship(
    qb: &mut QueryBuilder<'_, Sqlite>,
    anchor: Anchor,
    relationship: Relationship,
    alias: &str,
    tenant: &str,
) {
    match relationship {
        Relationship::Teaches { teacher_id } => {
            let target = match anchor {
                // tenant scope only
                Anchor::School => return,
                Anchor::ClassSelf => column(alias, "id"),
                Anchor::Class(col) => column(alias, col),
                Anchor::StudentSelf => column(alias, "class_id"),
                Anchor::Student(col) => {
                    qb.push(format!(
                        " AND {} IN (SELECT st.id FROM students st WHERE st.class_id IN ",
                        column(alias, col)
                    ));
                    push_teacher_classes(qb, teacher_id);
                    qb.push(")");
                    return;
                }
            };
            qb.push(format!(" AND {} IN ", target));
            push_teacher_classes(qb, teacher_id);
        }
        Relationship::Guardian { parent_id } => match anchor {
            Anchor::School => {
                qb.push(format!(
                    " AND {} IN (SELECT s.school_id FROM students s \
                     JOIN guardianships g ON g.student_id = s.id WHERE g.parent_id = ",
                    tenant
                ))
                .push_bind(parent_id.to_string())
                .push(")");
            }
            Anchor::ClassSelf | Anchor::Class(_) => {
                let target = match anchor {
                    Anchor::Class(col) => column(alias, col),
                    _ => column(alias, "id"),
                };
                qb.push(format!(
                    " AND {} IN (SELECT s.class_id FROM students s \
                     JOIN guardianships g ON g.student_id = s.id WHERE g.parent_id = ",
                    target
                ))
                .push_bind(parent_id.to_string())
                .push(")");
            }
            Anchor::StudentSelf | Anchor::Student(_) => {
                let target = match anchor {
                    Anchor::Student(col) => column(alias, col),
                    _ => column(alias, "id"),
                };
                qb.push(format!(
                    " AND {} IN (SELECT g.student_id FROM guardianships g WHERE g.parent_id = ",
                    target
                ))
                .push_bind(parent_id.to_string())
                .push(")");
            }
        },
    }
}

/// `(classes the teacher supervises UNION classes with a lesson they teach)`
pub(crate) fn push_teacher_classes(qb: &mut QueryBuilder<'_, Sqlite>, teacher_id: Uuid) {
    qb.push("(SELECT c.id FROM classes c WHERE c.supervisor_id = ")
        .push_bind(teacher_id.to_string())
        .push(" UNION SELECT l.class_id FROM lessons l WHERE l.teacher_id = ")
        .push_bind(teacher_id.to_string())
        .push(")");
}

#[derive(Debug, Clone)]
enum Condition {
    Compare {
        column: &'static str,
        op: &'static str,
        value: SqlValue,
    },
    IsNull(&'static str),
    InSelect {
        column: &'static str,
        select: &'static str,
        value: SqlValue,
    },
    Search {
        columns: &'static [&'static str],
        pattern: String,
    },
}

/// Caller-supplied narrowing on top of the tenant predicate.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    conditions: Vec<Condition>,
}

impl RowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn compare(mut self, column: &'static str, op: &'static str, value: SqlValue) -> Self {
        self.conditions.push(Condition::Compare { column, op, value });
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.compare(column, "=", value.into())
    }

    pub fn eq_opt<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.eq(column, v),
            None => self,
        }
    }

    pub fn gte_opt<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.compare(column, ">=", v.into()),
            None => self,
        }
    }

    pub fn lte_opt<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.compare(column, "<=", v.into()),
            None => self,
        }
    }

    pub fn is_null(mut self, column: &'static str) -> Self {
        self.conditions.push(Condition::IsNull(column));
        self
    }

    /// `column IN (<select> ?)`, where `select` ends with the single
    /// placeholder comparison, e.g.
    /// `"SELECT g.student_id FROM guardianships g WHERE g.parent_id = "`.
    pub fn in_select(
        mut self,
        column: &'static str,
        select: &'static str,
        value: impl Into<SqlValue>,
    ) -> Self {
        self.conditions.push(Condition::InSelect {
            column,
            select,
            value: value.into(),
        });
        self
    }

    /// Case-insensitive substring match over any of `columns`.
    pub fn search(mut self, columns: &'static [&'static str], term: Option<&str>) -> Self {
        if let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) {
            self.conditions.push(Condition::Search {
                columns,
                pattern: super::make_like_pattern(&term.to_lowercase()),
            });
        }
        self
    }

    pub(crate) fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for condition in &self.conditions {
            match condition {
                Condition::Compare { column, op, value } => {
                    qb.push(format!(" AND {} {} ", column, op));
                    push_value(qb, value.clone());
                }
                Condition::IsNull(column) => {
                    qb.push(format!(" AND {} IS NULL", column));
                }
                Condition::InSelect {
                    column,
                    select,
                    value,
                } => {
                    qb.push(format!(" AND {} IN ({}", column, select));
                    push_value(qb, value.clone());
                    qb.push(")");
                }
                Condition::Search { columns, pattern } => {
                    qb.push(" AND (");
                    for (i, column) in columns.iter().enumerate() {
                        if i > 0 {
                            qb.push(" OR ");
                        }
                        qb.push(format!("LOWER({}) LIKE ", column))
                            .push_bind(pattern.clone())
                            .push(" ESCAPE '\\'");
                    }
                    qb.push(")");
                }
            }
        }
    }
}

/// Column assignments for a partial update.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    sets: Vec<(&'static str, SqlValue)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column, value.into()));
        self
    }

    /// Skips the column when `value` is `None`.
    pub fn set_opt<V: Into<SqlValue>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Rows that block a delete, keyed by the child collection's name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependents(Vec<(&'static str, u64)>);

impl Dependents {
    pub fn new(counts: Vec<(&'static str, u64)>) -> Self {
        Self(counts)
    }

    /// True when nothing blocks the delete.
    pub fn is_clear(&self) -> bool {
        self.0.iter().all(|(_, n)| *n == 0)
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, n)| *n)
    }

    pub fn counts(&self) -> &[(&'static str, u64)] {
        &self.0
    }
}

impl Serialize for Dependents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, count) in &self.0 {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

/// A child-table reference: `(response key, table, foreign-key column)`.
pub type DependentRef = (&'static str, &'static str, &'static str);

/// Counts, per reference, the child rows pointing at `id`.
pub async fn count_dependents(
    pool: &SqlitePool,
    id: Uuid,
    refs: &[DependentRef],
) -> Result<Dependents, DbError> {
    let mut counts = Vec::with_capacity(refs.len());
    for (key, table, column) in refs {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ",
            table, column
        ));
        qb.push_bind(id.to_string());
        let n: i64 = qb.build_query_scalar().fetch_one(pool).await?;
        counts.push((*key, n.max(0) as u64));
    }
    Ok(Dependents(counts))
}

/// Number of `kind` rows visible under `predicate` and matching `filter`.
pub async fn count_visible(
    pool: &SqlitePool,
    kind: ResourceKind,
    predicate: &Predicate,
    filter: &RowFilter,
) -> Result<u64, DbError> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT COUNT(*) FROM {} WHERE 1 = 1",
        kind.table()
    ));
    push_predicate(&mut qb, kind, predicate);
    filter.push(&mut qb);
    let n: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(n.max(0) as u64)
}

/// Static description of a tenant-scoped table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScopedTable {
    pub kind: ResourceKind,
    pub columns: &'static str,
    pub order_by: &'static str,
}

impl ScopedTable {
    fn select(&self) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            self.columns,
            self.kind.table()
        ))
    }

    fn where_clause(&self, qb: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate, filter: &RowFilter) {
        push_predicate(qb, self.kind, predicate);
        filter.push(qb);
    }

    /// One page of visible rows plus the total visible count.
    pub async fn list<R, T>(
        &self,
        pool: &SqlitePool,
        predicate: &Predicate,
        filter: &RowFilter,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<T>, DbError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        T: TryFrom<R, Error = DbError>,
    {
        let total = self.count(pool, predicate, filter).await?;

        let mut qb = self.select();
        self.where_clause(&mut qb, predicate, filter);
        qb.push(format!(" ORDER BY {} LIMIT ", self.order_by))
            .push_bind(i64::from(pagination.limit()))
            .push(" OFFSET ")
            .push_bind(i64::from(pagination.offset()));

        let rows: Vec<R> = qb.build_query_as().fetch_all(pool).await?;
        let items = rows
            .into_iter()
            .map(T::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaginatedResult::new(items, total, pagination))
    }

    /// Every visible row, unpaginated.
    pub async fn all<R, T>(
        &self,
        pool: &SqlitePool,
        predicate: &Predicate,
        filter: &RowFilter,
    ) -> Result<Vec<T>, DbError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        T: TryFrom<R, Error = DbError>,
    {
        let mut qb = self.select();
        self.where_clause(&mut qb, predicate, filter);
        qb.push(format!(" ORDER BY {}", self.order_by));
        let rows: Vec<R> = qb.build_query_as().fetch_all(pool).await?;
        rows.into_iter().map(T::try_from).collect()
    }

    pub async fn count(
        &self,
        pool: &SqlitePool,
        predicate: &Predicate,
        filter: &RowFilter,
    ) -> Result<u64, DbError> {
        count_visible(pool, self.kind, predicate, filter).await
    }

    /// The row with `id`, if it is visible under `predicate`.
    pub async fn find<R, T>(
        &self,
        pool: &SqlitePool,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<Option<T>, DbError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        T: TryFrom<R, Error = DbError>,
    {
        let mut qb = self.select();
        qb.push(" AND id = ").push_bind(id.to_string());
        push_predicate(&mut qb, self.kind, predicate);
        let row: Option<R> = qb.build_query_as().fetch_optional(pool).await?;
        row.map(T::try_from).transpose()
    }

    pub async fn exists(
        &self,
        pool: &SqlitePool,
        predicate: &Predicate,
        id: Uuid,
    ) -> Result<bool, DbError> {
        let filter = RowFilter::new().eq("id", id);
        Ok(self.count(pool, predicate, &filter).await? > 0)
    }

    /// Applies `changes` and bumps `updated_at`. Returns false when no row
    /// has `id`.
    pub async fn update(&self, pool: &SqlitePool, id: Uuid, changes: Changes) -> Result<bool, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", self.kind.table()));
        for (column, value) in changes.sets {
            qb.push(format!("{} = ", column));
            push_value(&mut qb, value);
            qb.push(", ");
        }
        qb.push("updated_at = ")
            .push_bind(now_ts())
            .push(" WHERE id = ")
            .push_bind(id.to_string());
        let result = qb.build().execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, pool: &SqlitePool, id: Uuid) -> Result<bool, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {} WHERE id = ", self.kind.table()));
        qb.push_bind(id.to_string());
        let result = qb.build().execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(kind: ResourceKind, predicate: Predicate) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM t WHERE 1 = 1");
        push_predicate(&mut qb, kind, &predicate);
        qb.sql().to_string()
    }

    #[test]
    fn test_unrestricted_adds_nothing() {
        assert_eq!(
            render(ResourceKind::Student, Predicate::Unrestricted),
            "SELECT 1 FROM t WHERE 1 = 1"
        );
    }

    #[test]
    fn test_fail_closed_matches_nothing() {
        assert!(render(ResourceKind::Student, Predicate::FailClosed).ends_with(" AND 1 = 0"));
    }

    #[test]
    fn test_tenant_uses_tenant_column() {
        let school_id = Uuid::new_v4();
        assert!(render(ResourceKind::School, Predicate::Tenant { school_id }).ends_with(" AND id = ?"));
        assert!(render(ResourceKind::Exam, Predicate::Tenant { school_id })
            .ends_with(" AND school_id = ?"));
    }

    #[test]
    fn test_teacher_relationship_is_intersected_with_tenant() {
        let teacher_id = Uuid::new_v4();
        let sql = render(
            ResourceKind::Student,
            Predicate::Related {
                school_id: Uuid::new_v4(),
                relationship: Relationship::Teaches { teacher_id },
            },
        );
        assert!(sql.contains(" AND school_id = ?"));
        assert!(sql.contains(" AND class_id IN (SELECT c.id FROM classes c WHERE c.supervisor_id = ?"));
        assert!(sql.contains("UNION SELECT l.class_id FROM lessons l WHERE l.teacher_id = ?"));
        assert!(!sql.contains(&teacher_id.to_string()));
    }

    #[test]
    fn test_guardian_on_school_anchored_rows() {
        let sql = render(
            ResourceKind::Event,
            Predicate::Related {
                school_id: Uuid::new_v4(),
                relationship: Relationship::Guardian {
                    parent_id: Uuid::new_v4(),
                },
            },
        );
        assert!(sql.contains("school_id IN (SELECT s.school_id FROM students s"));
    }

    #[test]
    fn test_alias_qualifies_columns() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM attendance a WHERE 1 = 1");
        push_predicate_on(
            &mut qb,
            ResourceKind::Attendance,
            &Predicate::Related {
                school_id: Uuid::new_v4(),
                relationship: Relationship::Guardian {
                    parent_id: Uuid::new_v4(),
                },
            },
            "a",
        );
        let sql = qb.sql();
        assert!(sql.contains(" AND a.school_id = ?"));
        assert!(sql.contains(" AND a.student_id IN (SELECT g.student_id FROM guardianships g"));
    }

    #[test]
    fn test_row_filter_binds_values() {
        let filter = RowFilter::new()
            .eq("class_id", Uuid::new_v4())
            .eq_opt::<String>("status", None)
            .gte_opt("date", Some(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()))
            .search(&["first_name", "last_name"], Some("  Ada "));
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM t WHERE 1 = 1");
        filter.push(&mut qb);
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM t WHERE 1 = 1 AND class_id = ? AND date >= ? \
             AND (LOWER(first_name) LIKE ? ESCAPE '\\' OR LOWER(last_name) LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_in_select() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM students WHERE 1 = 1");
        RowFilter::new()
            .in_select(
                "id",
                "SELECT g.student_id FROM guardianships g WHERE g.parent_id = ",
                Uuid::new_v4(),
            )
            .push(&mut qb);
        assert!(qb
            .sql()
            .ends_with(" AND id IN (SELECT g.student_id FROM guardianships g WHERE g.parent_id = ?)"));
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let mut qb = QueryBuilder::<Sqlite>::new("X");
        RowFilter::new().search(&["name"], Some("   ")).push(&mut qb);
        assert_eq!(qb.sql(), "X");
    }

    #[test]
    fn test_dependents_serialize_in_order() {
        let deps = Dependents::new(vec![("lessons", 0), ("assignments", 3), ("examQuestions", 1)]);
        assert!(!deps.is_clear());
        assert_eq!(deps.get("assignments"), Some(3));
        assert_eq!(
            serde_json::to_string(&deps).unwrap(),
            r#"{"lessons":0,"assignments":3,"examQuestions":1}"#
        );
        assert!(Dependents::new(vec![("terms", 0)]).is_clear());
    }
}
