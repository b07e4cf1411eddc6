//! Subcommand implementations.

mod database;
mod serve;

pub use database::{open_database, run_migrate, run_seed_admin};
pub use serve::run_server;
