//! # scholar-api
//!
//! REST API server for Scholar.
//!
//! Resource routes live under `/api/v1`; health, readiness and Prometheus
//! endpoints are mounted at the root.

pub mod auth;
pub mod dto;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::CurrentUser;
pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
