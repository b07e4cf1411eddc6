use crate::auth::{Role, User};
use serde::Serialize;
use uuid::Uuid;

/// The authenticated principal behind a request.
///
/// `role` is `None` when the token names a role this build does not know;
/// such callers pass no guard and resolve to an empty filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: Uuid,
    pub role: Option<Role>,
    pub school_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

impl Identity {
    /// Identity with a known role and the links stored on the account.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            role: Some(user.role),
            school_id: user.school_id,
            teacher_id: user.teacher_id,
            parent_id: user.parent_id,
            student_id: user.student_id,
        }
    }

    /// Identity for a token whose role claim is taken verbatim.
    pub fn from_claimed_role(user: &User, claimed_role: &str) -> Self {
        Self {
            role: claimed_role.parse().ok(),
            ..Self::from_user(user)
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(Role::SuperAdmin)
    }

    /// Role name for logs; `"unknown"` when unrecognised.
    pub fn role_name(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_claimed_role_is_none() {
        let user = User::new("x@y.test", "h", "X", "Y", Role::Teacher, None);
        let identity = Identity::from_claimed_role(&user, "janitor");
        assert_eq!(identity.role, None);
        assert_eq!(identity.role_name(), "unknown");

        let identity = Identity::from_claimed_role(&user, "teacher");
        assert!(identity.has_role(Role::Teacher));
    }
}
