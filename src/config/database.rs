//! Where allocation state lives: backend choice and connection target.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::bootstrap::allocator_base_dir;
use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

/// Placeholder URL carried when the libSQL backend is selected.
const LIBSQL_URL_PLACEHOLDER: &str = "unused://libsql";

/// Store holding agents, work items and session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseBackend {
    /// Shared server; agent selection uses `SKIP LOCKED`.
    #[default]
    Postgres,
    /// Local file; allocators on the same file serialize.
    LibSql,
}

impl DatabaseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::LibSql => "libsql",
        }
    }
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DatabaseBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if matches!(name.as_str(), "postgres" | "postgresql" | "pg") {
            Ok(Self::Postgres)
        } else if matches!(name.as_str(), "libsql" | "sqlite" | "turso") {
            Ok(Self::LibSql)
        } else {
            Err(format!("unknown store '{s}' (use postgres or libsql)"))
        }
    }
}

/// TLS policy for PostgreSQL connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// TLS with the platform roots.
    #[default]
    Prefer,
    /// TLS; the connection fails without it.
    Require,
}

impl SslMode {
    const ALL: [Self; 3] = [Self::Disable, Self::Prefer, Self::Require];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sslmode '{s}' (use disable, prefer or require)"))
    }
}

/// Connection settings for the allocation store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    /// PostgreSQL connection string. A placeholder under libSQL.
    pub url: SecretString,
    /// Upper bound on pooled PostgreSQL connections.
    pub pool_size: usize,
    pub ssl_mode: SslMode,
    /// libSQL database file. Set whenever the backend is libSQL.
    pub libsql_path: Option<PathBuf>,
}

/// Parse an optional env var with `FromStr<Err = String>`, mapping failures
/// to `InvalidValue`.
fn parse_choice<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    optional_env(key)?
        .map(|raw| {
            raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: key.to_string(),
                message,
            })
        })
        .transpose()
}

impl DatabaseConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        let backend = parse_choice::<DatabaseBackend>("DATABASE_BACKEND")?.unwrap_or_default();
        let ssl_mode = parse_choice::<SslMode>("DATABASE_SSLMODE")?.unwrap_or_default();

        let url = match (optional_env("DATABASE_URL")?, backend) {
            (Some(url), _) => url,
            (None, DatabaseBackend::LibSql) => LIBSQL_URL_PLACEHOLDER.to_string(),
            (None, DatabaseBackend::Postgres) => {
                return Err(ConfigError::MissingRequired {
                    key: "DATABASE_URL".to_string(),
                    hint: "Point it at the allocation database, or set DATABASE_BACKEND=libsql"
                        .to_string(),
                });
            }
        };

        let pool_size: usize = parse_optional_env("DATABASE_POOL_SIZE", 10)?;
        if pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DATABASE_POOL_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let libsql_path = match optional_env("LIBSQL_PATH")? {
            Some(path) => Some(PathBuf::from(path)),
            None if backend == DatabaseBackend::LibSql => Some(default_libsql_path()),
            None => None,
        };

        Ok(Self {
            backend,
            url: SecretString::from(url),
            pool_size,
            ssl_mode,
            libsql_path,
        })
    }

    /// The connection string in clear text.
    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Default libSQL database path (~/.agent-allocator/allocator.db).
pub fn default_libsql_path() -> PathBuf {
    allocator_base_dir().join("allocator.db")
}
