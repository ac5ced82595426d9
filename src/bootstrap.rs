//! Startup paths and `.env` loading.
//!
//! The allocator keeps no settings on disk of its own. The base directory
//! only holds an optional `.env` file and the default libSQL database.

use std::path::PathBuf;

/// Base directory for allocator state: `~/.agent-allocator`.
///
/// `AGENT_ALLOCATOR_HOME` overrides the location.
pub fn allocator_base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("AGENT_ALLOCATOR_HOME")
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agent-allocator")
}

/// Load `./.env`, then `~/.agent-allocator/.env`.
///
/// dotenvy never overrides a variable that is already set, so the process
/// environment wins, then the working directory file, then the home file.
/// Missing files are ignored.
pub fn load_env() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    let home_env = allocator_base_dir().join(".env");
    if home_env.exists() {
        if let Err(e) = dotenvy::from_path(&home_env) {
            tracing::warn!(path = %home_env.display(), "failed to load .env: {e}");
        }
    }
}
