use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Assignment,
    Event,
    Order,
    ReportCard,
    Verification,
    Announcement,
}

text_enum!(NotificationCategory {
    Assignment => "assignment",
    Event => "event",
    Order => "order",
    ReportCard => "report_card",
    Verification => "verification",
    Announcement => "announcement",
});

/// An inbox entry for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub school_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub metadata: serde_json::Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Content shared by every notification of one fan-out.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub school_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub metadata: serde_json::Value,
}

impl NewNotification {
    pub fn new(
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            school_id: None,
            title: title.into(),
            body: body.into(),
            category,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn in_school(mut self, school_id: Uuid) -> Self {
        self.school_id = Some(school_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
