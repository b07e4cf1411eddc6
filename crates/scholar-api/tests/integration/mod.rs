//! Integration test modules.

pub mod access_tests;
pub mod analytics_tests;
pub mod auth_tests;
pub mod common;
pub mod health_tests;
pub mod resource_tests;
