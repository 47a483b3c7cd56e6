//! Bearer-token persistence and the injectable token seam.
//!
//! The realtime client reads the token at connect time and attaches it as an
//! `Authorization: Bearer <token>` header. An absent token is not an error:
//! the connection proceeds unauthenticated and authorization is left to the
//! server.

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::debug;

use crate::constants;
use crate::error::KitResult;
use crate::platform;

/// Source of the bearer token attached at connect time.
///
/// Object-safe so tests and embedders can supply their own implementation
/// instead of touching the on-disk store.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when no session is persisted.
    fn token(&self) -> Option<String>;
}

/// Fixed token, for tests and embedding.
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// File-backed token store under the platform data directory.
///
/// The token is kept in memory after the first read; `save` and `clear`
/// update both the cache and the file.
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<String>>,
}

impl FileTokenStore {
    /// Open the store at the default location (`<data_dir>/auth_token`).
    pub fn open_default() -> KitResult<Self> {
        let path = platform::data_dir()?.join(constants::AUTH_TOKEN_FILE);
        Ok(Self::open_at(path))
    }

    /// Open the store at a specific path.
    pub fn open_at(path: PathBuf) -> Self {
        let cached = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let token = contents.trim().to_string();
                if token.is_empty() { None } else { Some(token) }
            }
            Err(_) => None,
        };
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    /// Persist a new token.
    pub fn save(&self, token: &str) -> KitResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        if let Ok(mut cached) = self.cached.write() {
            *cached = Some(token.to_string());
        }
        debug!("auth token saved");
        Ok(())
    }

    /// Remove the persisted token.
    pub fn clear(&self) -> KitResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        if let Ok(mut cached) = self.cached.write() {
            *cached = None;
        }
        debug!("auth token cleared");
        Ok(())
    }
}

impl TokenProvider for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.cached.read().ok().and_then(|c| c.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken(None).token(), None);
        assert_eq!(
            StaticToken(Some("abc".into())).token(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_token");

        let store = FileTokenStore::open_at(path.clone());
        assert_eq!(store.token(), None);

        store.save("jwt-token-123").unwrap();
        assert_eq!(store.token(), Some("jwt-token-123".to_string()));

        // A fresh store sees the persisted value
        let reopened = FileTokenStore::open_at(path.clone());
        assert_eq!(reopened.token(), Some("jwt-token-123".to_string()));

        store.clear().unwrap();
        assert_eq!(store.token(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_whitespace_only_file_is_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth_token");
        std::fs::write(&path, "\n  \n").unwrap();

        let store = FileTokenStore::open_at(path);
        assert_eq!(store.token(), None);
    }
}
