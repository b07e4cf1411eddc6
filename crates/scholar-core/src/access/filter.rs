use super::{Anchor, Identity, ResourceKind};
use crate::auth::Role;
use uuid::Uuid;

/// A graph edge that grants visibility beyond the tenant column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// Classes the teacher supervises, or teaches at least one lesson in.
    Teaches { teacher_id: Uuid },
    /// Students the parent is guardian of.
    Guardian { parent_id: Uuid },
}

/// Row restriction derived from the caller, intersected with every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Every row.
    Unrestricted,
    /// Rows owned by one school.
    Tenant { school_id: Uuid },
    /// Rows owned by one school and reachable through a relationship edge.
    Related {
        school_id: Uuid,
        relationship: Relationship,
    },
    /// No rows.
    FailClosed,
}

impl Predicate {
    pub fn is_fail_closed(&self) -> bool {
        matches!(self, Predicate::FailClosed)
    }

    /// The school every visible row belongs to, when there is exactly one.
    pub fn school_id(&self) -> Option<Uuid> {
        match self {
            Predicate::Tenant { school_id } | Predicate::Related { school_id, .. } => {
                Some(*school_id)
            }
            Predicate::Unrestricted | Predicate::FailClosed => None,
        }
    }
}

/// Maps a caller to the rows of `kind` it may see.
///
/// `narrowing` is the optional `schoolId` query parameter. Only a super
/// admin's view is narrowed by it; everyone else is already pinned to their
/// own school and the parameter is ignored.
///
/// Anything missing (role, school, the teacher or parent record a role
/// depends on) resolves to [`Predicate::FailClosed`].
pub fn resolve_filter(identity: &Identity, kind: ResourceKind, narrowing: Option<Uuid>) -> Predicate {
    let Some(role) = identity.role else {
        return Predicate::FailClosed;
    };

    if role == Role::SuperAdmin {
        return match narrowing {
            Some(school_id) => Predicate::Tenant { school_id },
            None => Predicate::Unrestricted,
        };
    }

    let Some(school_id) = identity.school_id else {
        return Predicate::FailClosed;
    };

    match role {
        Role::SuperAdmin => Predicate::Unrestricted,
        Role::SchoolAdmin | Role::Principal => Predicate::Tenant { school_id },
        Role::Teacher => match (identity.teacher_id, kind.anchor()) {
            (None, _) => Predicate::FailClosed,
            (Some(_), Anchor::School) => Predicate::Tenant { school_id },
            (Some(teacher_id), _) => Predicate::Related {
                school_id,
                relationship: Relationship::Teaches { teacher_id },
            },
        },
        Role::Parent => match identity.parent_id {
            None => Predicate::FailClosed,
            Some(parent_id) => Predicate::Related {
                school_id,
                relationship: Relationship::Guardian { parent_id },
            },
        },
    }
}
