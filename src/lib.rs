pub mod analytics;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod types;
