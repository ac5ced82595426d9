//! Configuration for the agent allocator.
//!
//! Everything is read from the environment. `.env` files are loaded by
//! [`crate::bootstrap::load_env`] before [`Config::from_env`] runs, and real
//! environment variables always win over file values.

mod allocator;
mod database;
pub(crate) mod helpers;

pub use self::allocator::{AllocatorConfig, DEFAULT_WAIT_SECS, parse_work_item_ids};
pub use self::database::{DatabaseBackend, DatabaseConfig, SslMode, default_libsql_path};
pub use crate::observability::ObservabilityConfig;

use crate::error::ConfigError;

/// Main configuration for the allocator.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub allocator: AllocatorConfig,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        crate::bootstrap::load_env();

        Ok(Self {
            database: DatabaseConfig::resolve()?,
            allocator: AllocatorConfig::resolve()?,
            observability: ObservabilityConfig::resolve()?,
        })
    }
}
