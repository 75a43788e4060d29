pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod sheets;
pub mod validate;
