//! # scholar-core
//!
//! Domain model, access control and persistence for the Scholar
//! school-management API.
//!
//! Every request flows through the same layers: the caller's [`Identity`] is
//! checked against an endpoint allow-list ([`authorize`]), turned into a row
//! [`Predicate`] ([`resolve_filter`]), and the predicate is rendered into
//! every query the [`db`] repositories issue.

pub mod access;
pub mod analytics;
pub mod auth;
pub mod db;
pub mod fanout;
pub mod grading;
pub mod models;
pub mod schedule;

pub use access::{
    authorize, resolve_filter, AccessDenied, Identity, Predicate, Relationship, ResourceKind,
};
pub use analytics::AnalyticsComposer;
pub use fanout::{Audience, Notifier};
pub use schedule::{ranges_overlap, ClockTime};

// Auth exports
pub use auth::password::{
    hash_password, validate_password_strength, verify_password, PasswordError,
};
pub use auth::token::{Claims, TokenError, TokenService};
pub use auth::{Role, User, UserFilter};
