pub mod aggregates;
pub mod auth;
pub mod cache;
pub mod client;
pub mod comments;
pub mod config;
pub mod coordinator; // optimistic client-side updates over `cache`
pub mod error;
pub mod models;
pub mod openapi;
pub mod ranking;
pub mod repo;
pub mod routes;
pub mod scope;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
