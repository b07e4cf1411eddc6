//! Recipient inboxes.
//!
//! Notifications belong to one user and are always scoped by recipient,
//! never by the tenant predicate.

use super::convert::{now_ts, parse_enum, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid};
use super::{DbError, DbPool, PaginatedResult, Pagination};
use crate::auth::Role;
use crate::fanout::Audience;
use crate::models::{NewNotification, Notification};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

const COLUMNS: &str =
    "id, user_id, school_id, title, body, category, metadata, read_at, created_at";

/// Rows per multi-row INSERT; keeps each statement well under SQLite's
/// bound-parameter limit.
const BATCH_ROWS: usize = 500;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Writes one copy of `notification` per recipient in a single
    /// transaction and returns the number of rows written.
    async fn insert_batch(
        &self,
        user_ids: &[Uuid],
        notification: &NewNotification,
    ) -> Result<u64, DbError>;

    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Notification>, DbError>;

    async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<Notification>, DbError>;

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, DbError>;

    /// Marks one notification read; false when the recipient has no such
    /// notification.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, DbError>;

    /// Returns how many notifications changed.
    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, DbError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, DbError>;

    /// Active accounts the audience currently resolves to, without
    /// duplicates.
    async fn recipients(&self, audience: &Audience) -> Result<Vec<Uuid>, DbError>;
}

pub struct SqliteNotificationRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn insert_batch(
        &self,
        user_ids: &[Uuid],
        notification: &NewNotification,
    ) -> Result<u64, DbError> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let metadata = serde_json::to_string(&notification.metadata)?;
        let school_id = notification.school_id.map(|id| id.to_string());
        let now = now_ts();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let mut written = 0;
        for chunk in user_ids.chunks(BATCH_ROWS) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "INSERT INTO notifications ({}) ",
                COLUMNS
            ));
            qb.push_values(chunk, |mut row, user_id| {
                row.push_bind(Uuid::new_v4().to_string())
                    .push_bind(user_id.to_string())
                    .push_bind(school_id.clone())
                    .push_bind(notification.title.clone())
                    .push_bind(notification.body.clone())
                    .push_bind(notification.category.as_str())
                    .push_bind(metadata.clone())
                    .push_bind(Option::<String>::None)
                    .push_bind(now.clone());
            });
            written += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(written)
    }

    async fn list(
        &self,
        user_id: Uuid,
        unread_only: bool,
        pagination: &Pagination,
    ) -> Result<PaginatedResult<Notification>, DbError> {
        let unread = if unread_only { " AND read_at IS NULL" } else { "" };

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?{}",
            unread
        ))
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE user_id = ?{} \
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?",
            COLUMNS, unread
        ))
        .bind(user_id.to_string())
        .bind(i64::from(pagination.limit()))
        .bind(i64::from(pagination.offset()))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PaginatedResult::new(items, total.max(0) as u64, pagination))
    }

    async fn find(&self, user_id: Uuid, id: Uuid) -> Result<Option<Notification>, DbError> {
        let row: Option<NotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM notifications WHERE id = ? AND user_id = ?",
            COLUMNS
        ))
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Notification::try_from).transpose()
    }

    async fn unread_count(&self, user_id: Uuid) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND user_id = ?",
        )
        .bind(now_ts())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, DbError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = ? WHERE user_id = ? AND read_at IS NULL",
        )
        .bind(now_ts())
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
            .bind(id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recipients(&self, audience: &Audience) -> Result<Vec<Uuid>, DbError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT u.id FROM users u WHERE u.is_active = 1 AND ");
        match audience {
            Audience::Users(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                qb.push("u.id IN (");
                let mut list = qb.separated(", ");
                for id in ids {
                    list.push_bind(id.to_string());
                }
                list.push_unseparated(")");
            }
            Audience::ClassGuardians(class_id) => {
                qb.push(
                    "u.parent_id IN (SELECT g.parent_id FROM guardianships g \
                     JOIN students s ON s.id = g.student_id WHERE s.class_id = ",
                );
                qb.push_bind(class_id.to_string());
                qb.push(")");
            }
            Audience::StudentGuardians(student_id) => {
                qb.push("u.parent_id IN (SELECT parent_id FROM guardianships WHERE student_id = ");
                qb.push_bind(student_id.to_string());
                qb.push(")");
            }
            Audience::Parent(parent_id) => {
                qb.push("u.parent_id = ");
                qb.push_bind(parent_id.to_string());
            }
            Audience::School { school_id, roles } => {
                if roles.is_empty() {
                    return Ok(Vec::new());
                }
                qb.push("u.school_id = ");
                qb.push_bind(school_id.to_string());
                qb.push(" AND u.role IN (");
                let mut list = qb.separated(", ");
                for role in roles {
                    list.push_bind(role.as_str());
                }
                list.push_unseparated(")");
            }
        }
        qb.push(" ORDER BY u.id");

        let ids: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        ids.iter().map(|id| parse_uuid(id, "users.id")).collect()
    }
}

pub fn create_notification_repository(pool: &DbPool) -> Box<dyn NotificationRepository> {
    Box::new(SqliteNotificationRepository::new(pool.inner().clone()))
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    school_id: Option<String>,
    title: String,
    body: String,
    category: String,
    metadata: String,
    read_at: Option<String>,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: parse_uuid(&row.id, "notifications.id")?,
            user_id: parse_uuid(&row.user_id, "notifications.user_id")?,
            school_id: parse_opt_uuid(row.school_id, "notifications.school_id")?,
            title: row.title,
            body: row.body,
            category: parse_enum(&row.category, "notifications.category")?,
            metadata: serde_json::from_str(&row.metadata)?,
            read_at: parse_opt_ts(row.read_at)?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_school, seed_user, test_pool};
    use crate::db::create_parent_repository;
    use crate::db::test_support::{seed_class, seed_parent, seed_student};
    use crate::models::NotificationCategory;

    #[tokio::test]
    async fn test_batch_writes_one_row_per_recipient() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "NTF").await;
        let a = seed_user(&pool, Some(school.id), Role::Principal, "a@ntf.test").await;
        let b = seed_user(&pool, Some(school.id), Role::SchoolAdmin, "b@ntf.test").await;
        let repo = create_notification_repository(&pool);

        let n = NewNotification::new(NotificationCategory::Event, "Sports day", "Friday")
            .in_school(school.id)
            .with_metadata(serde_json::json!({"eventId": "x"}));
        assert_eq!(repo.insert_batch(&[a.id, b.id], &n).await.unwrap(), 2);
        assert_eq!(repo.insert_batch(&[], &n).await.unwrap(), 0);

        let inbox = repo.list(a.id, false, &Pagination::default()).await.unwrap();
        assert_eq!(inbox.total, 1);
        assert_eq!(inbox.items[0].metadata["eventId"], "x");
        assert_eq!(inbox.items[0].category, NotificationCategory::Event);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "NTX").await;
        let a = seed_user(&pool, Some(school.id), Role::Principal, "a@ntx.test").await;
        let repo = create_notification_repository(&pool);

        let n = NewNotification::new(NotificationCategory::Announcement, "Hi", "there");
        assert!(repo.insert_batch(&[a.id, Uuid::new_v4()], &n).await.is_err());
        assert_eq!(repo.unread_count(a.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_state_is_per_recipient() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "NTR").await;
        let a = seed_user(&pool, Some(school.id), Role::Teacher, "a@ntr.test").await;
        let b = seed_user(&pool, Some(school.id), Role::Teacher, "b@ntr.test").await;
        let repo = create_notification_repository(&pool);

        let n = NewNotification::new(NotificationCategory::Assignment, "Essay", "Due Monday");
        repo.insert_batch(&[a.id, b.id], &n).await.unwrap();
        repo.insert_batch(&[a.id], &n).await.unwrap();

        let mine = repo.list(a.id, true, &Pagination::default()).await.unwrap();
        assert_eq!(mine.total, 2);
        let first = mine.items[0].id;

        assert!(!repo.mark_read(b.id, first).await.unwrap());
        assert!(repo.mark_read(a.id, first).await.unwrap());
        assert_eq!(repo.unread_count(a.id).await.unwrap(), 1);
        assert_eq!(repo.mark_all_read(a.id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(a.id).await.unwrap(), 0);
        assert_eq!(repo.unread_count(b.id).await.unwrap(), 1);

        assert!(!repo.delete(b.id, first).await.unwrap());
        assert!(repo.delete(a.id, first).await.unwrap());
        assert!(repo.find(a.id, first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recipients_follow_guardianship_edges() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "NTG").await;
        let class = seed_class(&pool, school.id, "4A", None).await;
        let inside = seed_student(&pool, school.id, Some(class.id), "NTG-1").await;
        let outside = seed_student(&pool, school.id, None, "NTG-2").await;
        let (p1, u1) = seed_parent(&pool, school.id, "p1@ntg.test").await;
        let (p2, u2) = seed_parent(&pool, school.id, "p2@ntg.test").await;
        let parents = create_parent_repository(&pool);
        parents.add_guardianship(p1.id, inside.id, "mother").await.unwrap();
        parents.add_guardianship(p2.id, outside.id, "father").await.unwrap();
        let admin = seed_user(&pool, Some(school.id), Role::SchoolAdmin, "adm@ntg.test").await;
        let repo = create_notification_repository(&pool);

        let class_guardians = repo.recipients(&Audience::ClassGuardians(class.id)).await.unwrap();
        assert_eq!(class_guardians, vec![u1.id]);

        let guardians = repo.recipients(&Audience::StudentGuardians(outside.id)).await.unwrap();
        assert_eq!(guardians, vec![u2.id]);

        let admins = repo
            .recipients(&Audience::School {
                school_id: school.id,
                roles: vec![Role::SchoolAdmin, Role::Principal],
            })
            .await
            .unwrap();
        assert_eq!(admins, vec![admin.id]);

        assert!(repo.recipients(&Audience::Users(vec![])).await.unwrap().is_empty());
    }
}
