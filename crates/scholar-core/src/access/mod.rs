//! Who may see and change what.
//!
//! Access is decided in two steps, always in this order:
//!
//! 1. [`authorize`] checks the caller's role against an endpoint allow-list.
//!    A denied caller never reaches a lookup, so it learns nothing about
//!    which rows exist.
//! 2. [`resolve_filter`] turns the caller's identity into a [`Predicate`]
//!    that every read and write against a [`ResourceKind`] is intersected
//!    with. Rows outside the predicate are reported as not found.

mod filter;
mod guard;
mod identity;
mod resource;

pub use filter::{resolve_filter, Predicate, Relationship};
pub use guard::{authorize, AccessDenied, ADMINS, ANY_ROLE, STAFF, SUPER_ADMIN, TENANT_ADMINS};
pub use identity::Identity;
pub use resource::{Anchor, ResourceKind};
