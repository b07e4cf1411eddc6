//! Accounts, roles, and credential primitives.
//!
//! - [`Role`]: the five roles an account can hold
//! - [`User`]: a login account, optionally linked to a teacher, parent or
//!   student record
//! - [`password`]: Argon2id hashing
//! - [`token`]: JWT access tokens and opaque refresh tokens

pub mod password;
pub mod token;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account roles, from platform-wide to family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Operates the platform across every school.
    SuperAdmin,
    /// Administers a single school.
    SchoolAdmin,
    /// Runs a single school; same data scope as a school admin.
    Principal,
    /// Sees the classes they supervise or teach lessons in.
    Teacher,
    /// Sees the students they are guardian of.
    Parent,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::SchoolAdmin,
        Role::Principal,
        Role::Teacher,
        Role::Parent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::SchoolAdmin => "school_admin",
            Role::Principal => "principal",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
        }
    }

    /// True for roles bound to exactly one school.
    pub fn is_tenant_bound(&self) -> bool {
        !matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "school_admin" | "schooladmin" => Ok(Role::SchoolAdmin),
            "principal" => Ok(Role::Principal),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A login account.
///
/// Accounts are never deleted; `is_active = false` is the terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub school_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: Role,
        school_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into().trim().to_lowercase(),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            school_id,
            teacher_id: None,
            parent_id: None,
            student_id: None,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_teacher(mut self, teacher_id: Uuid) -> Self {
        self.teacher_id = Some(teacher_id);
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Filter for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_is_snake_case() {
        let json = serde_json::to_string(&Role::SchoolAdmin).unwrap();
        assert_eq!(json, "\"school_admin\"");
    }

    #[test]
    fn test_new_user_normalises_email() {
        let user = User::new(" Head@School.TEST ", "hash", "Ada", "Obi", Role::Principal, None);
        assert_eq!(user.email, "head@school.test");
        assert!(user.is_active);
        assert_eq!(user.full_name(), "Ada Obi");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a@b.test", "secret-hash", "A", "B", Role::Teacher, None);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "teacher");
    }
}
