//! Profile storage with pluggable backends.
//!
//! Supports:
//! - `file`: one JSON file per key in a local directory (guest mode, sessions)
//! - `memory`: in-memory key-value storage (non-persistent, for testing)
//! - `http`: the durable profile backend for authenticated users

mod guest;
mod http;
mod local;

pub use guest::{GuestStore, GUEST_ACHIEVEMENTS_KEY, GUEST_USER_KEY};
pub use http::HttpProfileStore;
pub use local::{FileKeyValueStore, InMemoryKeyValueStore};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::achievements::UnlockRecord;
use crate::profile::{MissionStats, RemoteUserPatch, UserProfile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Local storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Message reported by the backend, if it rejected the request.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            StoreError::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Device-local key-value storage keyed by fixed string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Whether values survive a process restart.
    fn is_persistent(&self) -> bool;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Durable per-user profile store, authenticated with the user's access token.
///
/// Every endpoint answers `{ success, message?, ...payload }`; a `success:
/// false` answer surfaces as [`StoreError::Rejected`].
#[async_trait]
pub trait RemoteProfileStore: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> StoreResult<UserProfile>;

    async fn update_progress(
        &self,
        access_token: &str,
        xp: u64,
        completed_missions: u64,
    ) -> StoreResult<()>;

    async fn unlock_planet(&self, access_token: &str, planet_id: u32) -> StoreResult<()>;

    async fn complete_mission(&self, access_token: &str, mission_xp: u64) -> StoreResult<()>;

    /// Report a mission outcome. Returns the updated statistics when the
    /// backend sends them back.
    async fn update_mission_stats(
        &self,
        access_token: &str,
        stats: &MissionStats,
    ) -> StoreResult<Option<RemoteUserPatch>>;

    async fn update_name(&self, access_token: &str, name: &str) -> StoreResult<()>;

    async fn update_avatar(&self, access_token: &str, avatar_id: &str) -> StoreResult<()>;

    async fn fetch_achievements(&self, access_token: &str) -> StoreResult<Vec<UnlockRecord>>;

    /// Record an unlock. Returns `true` if the backend did not have it yet.
    async fn unlock_achievement(&self, access_token: &str, achievement_id: &str)
        -> StoreResult<bool>;

    /// Create an account through the backend (confirms the email itself).
    async fn signup(&self, username: &str, email: &str, password: &str) -> StoreResult<()>;

    /// Create the profile record for a freshly signed-up user.
    async fn initialize_user(&self, access_token: &str, username: &str) -> StoreResult<()>;
}

/// Local store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalStoreType {
    Memory,
    #[default]
    File,
}

impl LocalStoreType {
    /// Parse from environment variable value.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            "file" | "json" => Self::File,
            _ => Self::default(),
        }
    }
}

/// Create a local key-value store based on type.
pub async fn create_local_store(
    store_type: LocalStoreType,
    base_dir: PathBuf,
) -> StoreResult<Arc<dyn KeyValueStore>> {
    match store_type {
        LocalStoreType::Memory => Ok(Arc::new(InMemoryKeyValueStore::new())),
        LocalStoreType::File => {
            let store = FileKeyValueStore::new(base_dir).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Sanitize a key for use as a filename.
pub fn sanitize_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_store_type_from_str() {
        assert_eq!(LocalStoreType::from_str("memory"), LocalStoreType::Memory);
        assert_eq!(LocalStoreType::from_str(" JSON "), LocalStoreType::File);
        assert_eq!(LocalStoreType::from_str("sqlite"), LocalStoreType::File);
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("guestUser"), "guestUser");
        assert_eq!(sanitize_key("kubrick.auth.session"), "kubrick.auth.session");
        assert_eq!(sanitize_key("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_key(".."), "default");
        assert_eq!(sanitize_key(""), "default");
    }

    #[tokio::test]
    async fn test_create_memory_store_is_not_persistent() {
        let store = create_local_store(LocalStoreType::Memory, PathBuf::from("/unused"))
            .await
            .expect("memory store");
        assert!(!store.is_persistent());
    }

    #[test]
    fn test_backend_message() {
        let err = StoreError::Rejected {
            status: 400,
            message: "User already registered".to_string(),
        };
        assert_eq!(err.backend_message(), Some("User already registered"));
        let err = StoreError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.backend_message().is_none());
    }
}
