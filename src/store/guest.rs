//! Guest profile persistence on top of a local key-value store.

use std::sync::Arc;

use super::{KeyValueStore, StoreResult};
use crate::achievements::{Ledger, UnlockRecord};
use crate::profile::UserProfile;

/// Key holding the guest profile JSON.
pub const GUEST_USER_KEY: &str = "guestUser";

/// Key holding the guest unlock ledger JSON.
pub const GUEST_ACHIEVEMENTS_KEY: &str = "guestAchievements";

/// Reads and writes the guest profile and ledger under fixed keys.
#[derive(Clone)]
pub struct GuestStore {
    kv: Arc<dyn KeyValueStore>,
}

impl GuestStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Load the stored guest profile with its ledger attached.
    ///
    /// A corrupt profile is treated as absent; a corrupt ledger as empty.
    pub async fn load(&self) -> StoreResult<Option<UserProfile>> {
        let Some(raw) = self.kv.get(GUEST_USER_KEY).await? else {
            return Ok(None);
        };

        let mut profile: UserProfile = match serde_json::from_str(&raw) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Failed to parse stored guest profile: {}", e);
                return Ok(None);
            }
        };

        let records = match self.kv.get(GUEST_ACHIEVEMENTS_KEY).await? {
            Some(raw) => serde_json::from_str::<Vec<UnlockRecord>>(&raw).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse stored guest achievements: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        profile.ledger = Ledger::from_records(records);

        Ok(Some(profile))
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        let raw = serde_json::to_string(profile)?;
        self.kv.set(GUEST_USER_KEY, &raw).await
    }

    pub async fn save_ledger(&self, ledger: &Ledger) -> StoreResult<()> {
        let raw = serde_json::to_string(ledger)?;
        self.kv.set(GUEST_ACHIEVEMENTS_KEY, &raw).await
    }

    /// Save profile and ledger together.
    pub async fn save(&self, profile: &UserProfile) -> StoreResult<()> {
        self.save_profile(profile).await?;
        self.save_ledger(&profile.ledger).await
    }

    /// Forget the guest entirely.
    pub async fn clear(&self) -> StoreResult<()> {
        self.kv.remove(GUEST_USER_KEY).await?;
        self.kv.remove(GUEST_ACHIEVEMENTS_KEY).await
    }
}
