//! CultureHub library crate
//!
//! Re-exports core modules for the server binary and integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod providers;
pub mod storage;

// Re-export commonly used types
pub use api::{router, AppState};
pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use storage::{MemoryStorage, PgStorage, Storage};
