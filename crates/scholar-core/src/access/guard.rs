use super::Identity;
use crate::auth::Role;
use thiserror::Error;
use tracing::warn;

pub const SUPER_ADMIN: &[Role] = &[Role::SuperAdmin];

/// Super admin plus the admin of the school itself.
pub const TENANT_ADMINS: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin];

pub const ADMINS: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin, Role::Principal];

pub const STAFF: &[Role] = &[
    Role::SuperAdmin,
    Role::SchoolAdmin,
    Role::Principal,
    Role::Teacher,
];

pub const ANY_ROLE: &[Role] = &Role::ALL;

/// Guard failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct AccessDenied {
    pub reason: &'static str,
}

impl AccessDenied {
    pub fn insufficient_role() -> Self {
        Self {
            reason: "insufficient role",
        }
    }
}

/// Checks the caller's role against an endpoint allow-list.
///
/// Must run before any lookup of the target resource.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> Result<(), AccessDenied> {
    match identity.role {
        Some(role) if allowed.contains(&role) => Ok(()),
        _ => {
            warn!(
                user_id = %identity.id,
                role = identity.role_name(),
                "Access denied: insufficient role"
            );
            metrics::counter!("scholar_access_denied_total").increment(1);
            Err(AccessDenied::insufficient_role())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn caller(role: Option<Role>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role,
            school_id: None,
            teacher_id: None,
            parent_id: None,
            student_id: None,
        }
    }

    #[test]
    fn test_allow_list() {
        assert!(authorize(&caller(Some(Role::Principal)), ADMINS).is_ok());
        assert!(authorize(&caller(Some(Role::Teacher)), STAFF).is_ok());
        assert!(authorize(&caller(Some(Role::Parent)), ANY_ROLE).is_ok());
    }

    #[test]
    fn test_denied_reason() {
        let denied = authorize(&caller(Some(Role::Teacher)), ADMINS).unwrap_err();
        assert_eq!(denied.reason, "insufficient role");
        assert_eq!(denied.to_string(), "insufficient role");
    }

    #[test]
    fn test_unknown_role_always_denied() {
        assert!(authorize(&caller(None), ANY_ROLE).is_err());
    }

    #[test]
    fn test_role_sets() {
        assert!(!ADMINS.contains(&Role::Teacher));
        assert!(STAFF.contains(&Role::Teacher));
        assert!(!STAFF.contains(&Role::Parent));
        assert_eq!(ANY_ROLE.len(), 5);
    }
}
