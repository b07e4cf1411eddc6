use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a school may operate on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(VerificationStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// A tenant. Every other record belongs to exactly one school.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub verification_status: VerificationStatus,
    pub verification_note: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl School {
    /// Members of a school may only sign in once it is approved.
    pub fn is_operational(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
    }
}

#[derive(Debug, Clone)]
pub struct NewSchool {
    pub name: String,
    pub code: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub verification_status: VerificationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct SchoolUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_status_text() {
        assert_eq!(VerificationStatus::Approved.as_str(), "approved");
        assert_eq!(
            "Rejected".parse::<VerificationStatus>().unwrap(),
            VerificationStatus::Rejected
        );
        assert!("verified".parse::<VerificationStatus>().is_err());
    }
}
