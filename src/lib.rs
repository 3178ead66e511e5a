pub mod application;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod limiter;
pub mod metrics;
