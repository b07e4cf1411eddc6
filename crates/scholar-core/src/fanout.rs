//! Notification fan-out.
//!
//! A write that matters to several people (a new assignment, a published
//! report card, an approved order) resolves its [`Audience`] to a set of
//! accounts once and stores one inbox row per account. Delivery runs after
//! the triggering write has committed and never fails it: errors are logged
//! and counted, and the caller gets `0` back.

use crate::auth::Role;
use crate::db::{create_notification_repository, DbError, DbPool, NotificationRepository};
use crate::models::NewNotification;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Explicit accounts.
    Users(Vec<Uuid>),
    /// Parent accounts guarding any student currently in the class.
    ClassGuardians(Uuid),
    /// Parent accounts guarding the student.
    StudentGuardians(Uuid),
    /// The login account of a parent record.
    Parent(Uuid),
    /// Every active account of the school holding one of `roles`.
    School { school_id: Uuid, roles: Vec<Role> },
}

impl Audience {
    /// The accounts that administer a school.
    pub fn school_admins(school_id: Uuid) -> Self {
        Audience::School {
            school_id,
            roles: vec![Role::SchoolAdmin, Role::Principal],
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Audience::Users(_) => "users",
            Audience::ClassGuardians(_) => "class_guardians",
            Audience::StudentGuardians(_) => "student_guardians",
            Audience::Parent(_) => "parent",
            Audience::School { .. } => "school",
        }
    }
}

/// Shared handle for creating notifications.
#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
}

impl Notifier {
    pub fn new(pool: &DbPool) -> Self {
        Self {
            repo: Arc::from(create_notification_repository(pool)),
        }
    }

    pub fn with_repository(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// Resolves the audience and writes one notification per recipient.
    ///
    /// Returns the number of notifications written. Failures are logged and
    /// reported as `0`.
    pub async fn notify(&self, audience: &Audience, notification: &NewNotification) -> u64 {
        match self.deliver(audience, notification).await {
            Ok(count) => count,
            Err(e) => {
                metrics::counter!("scholar_notification_fanout_failures_total").increment(1);
                error!(
                    audience = audience.label(),
                    category = %notification.category,
                    error = %e,
                    "Notification fan-out failed"
                );
                0
            }
        }
    }

    /// Like [`Notifier::notify`] but surfaces the error.
    pub async fn deliver(
        &self,
        audience: &Audience,
        notification: &NewNotification,
    ) -> Result<u64, DbError> {
        let recipients = self.repo.recipients(audience).await?;
        if recipients.is_empty() {
            debug!(audience = audience.label(), "No recipients for notification");
            return Ok(0);
        }

        let written = self.repo.insert_batch(&recipients, notification).await?;
        metrics::counter!("scholar_notifications_created_total").increment(written);
        info!(
            audience = audience.label(),
            category = %notification.category,
            recipients = written,
            "Notifications created"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_school, seed_user, test_pool};
    use crate::db::Pagination;
    use crate::models::NotificationCategory;

    #[tokio::test]
    async fn test_notifies_school_admins_only() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "FAN").await;
        let admin = seed_user(&pool, Some(school.id), Role::SchoolAdmin, "a@fan.test").await;
        let principal = seed_user(&pool, Some(school.id), Role::Principal, "p@fan.test").await;
        let teacher = seed_user(&pool, Some(school.id), Role::Teacher, "t@fan.test").await;
        let notifier = Notifier::new(&pool);

        let n = NewNotification::new(NotificationCategory::Verification, "Approved", "Welcome")
            .in_school(school.id);
        assert_eq!(notifier.notify(&Audience::school_admins(school.id), &n).await, 2);

        let repo = create_notification_repository(&pool);
        assert_eq!(repo.unread_count(admin.id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(principal.id).await.unwrap(), 1);
        assert_eq!(repo.unread_count(teacher.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_audience_writes_nothing() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "FAE").await;
        let notifier = Notifier::new(&pool);

        let n = NewNotification::new(NotificationCategory::Event, "Fair", "Saturday");
        let audience = Audience::School {
            school_id: school.id,
            roles: vec![Role::Parent],
        };
        assert_eq!(notifier.deliver(&audience, &n).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_users_are_skipped() {
        let pool = test_pool().await;
        let school = seed_school(&pool, "FAU").await;
        let user = seed_user(&pool, Some(school.id), Role::Teacher, "t@fau.test").await;
        let notifier = Notifier::new(&pool);

        let n = NewNotification::new(NotificationCategory::Announcement, "Hi", "All");
        let audience = Audience::Users(vec![user.id, Uuid::new_v4()]);
        assert_eq!(notifier.notify(&audience, &n).await, 1);

        let inbox = create_notification_repository(&pool)
            .list(user.id, false, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(inbox.items[0].title, "Hi");
    }
}
