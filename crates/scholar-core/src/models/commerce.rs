use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stock item families can order (uniforms, books...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: Uuid,
    pub school_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub school_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
    Delivered,
    Cancelled,
}

text_enum!(OrderStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Allowed moves: pending → approved/rejected/cancelled, approved →
    /// delivered/cancelled.
    pub fn can_become(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (
                OrderStatus::Pending,
                OrderStatus::Approved | OrderStatus::Rejected | OrderStatus::Cancelled
            ) | (
                OrderStatus::Approved,
                OrderStatus::Delivered | OrderStatus::Cancelled
            )
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialOrder {
    pub id: Uuid,
    pub school_id: Uuid,
    pub material_id: Uuid,
    pub student_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub ordered_by: Uuid,
    pub quantity: i64,
    pub total_price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub school_id: Uuid,
    pub material_id: Uuid,
    pub student_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub ordered_by: Uuid,
    pub quantity: i64,
    pub unit_price: f64,
}
