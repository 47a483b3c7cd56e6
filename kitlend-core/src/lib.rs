//! KitLend Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other KitLend crates:
//! - Application configuration (server URL, realtime tuning, logging)
//! - Global error types covering all error categories
//! - Bearer-token persistence and the `TokenProvider` seam
//! - Structured logging with tracing
//! - Platform directory resolution
//! - Common constants

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use auth::{FileTokenStore, StaticToken, TokenProvider};
pub use config::AppConfig;
pub use error::{KitError, KitResult};
pub use logging::init_logging;
