pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware; // per-scope rate limiting
pub mod models;
pub mod openapi;
pub mod orders;
pub mod pricing;
pub mod rate_limit; // in-memory rate limiting
pub mod recurring;
pub mod repo;
pub mod routes;
pub mod telemetry;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
