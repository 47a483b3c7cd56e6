//! Per-platform application directories.
//!
//! Everything KitLend persists (config, auth token, logs) lives under an
//! app-named folder inside the OS-standard locations resolved by `dirs`.

use std::path::PathBuf;

use crate::constants;
use crate::error::{KitError, KitResult};

fn app_dir(base: Option<PathBuf>, kind: &str) -> KitResult<PathBuf> {
    base.map(|dir| dir.join(constants::APP_NAME))
        .ok_or_else(|| KitError::Config(format!("could not determine {kind} directory")))
}

/// Application data directory (config file, auth token).
pub fn data_dir() -> KitResult<PathBuf> {
    app_dir(dirs::data_dir(), "data")
}

/// Application configuration directory.
pub fn config_dir() -> KitResult<PathBuf> {
    app_dir(dirs::config_dir(), "config")
}

/// Application cache directory.
pub fn cache_dir() -> KitResult<PathBuf> {
    app_dir(dirs::cache_dir(), "cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_end_with_app_name() {
        for dir in [data_dir(), config_dir(), cache_dir()] {
            let dir = dir.unwrap();
            assert!(dir.ends_with(constants::APP_NAME));
        }
    }
}
