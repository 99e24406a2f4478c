// Cache path utilities.
// Locates the on-disk SQLite store under the platform cache directory.

use std::path::PathBuf;

use directories::ProjectDirs;

/// File name of the persistent store inside the cache directory.
pub const DATABASE_FILE: &str = "cache.sqlite3";

/// Get the base cache directory (~/.cache/ghcache on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "ghcache").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Default path of the persistent store.
pub fn database_path() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(DATABASE_FILE))
}
