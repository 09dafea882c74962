//! Routes profile writes to the store that owns the profile.
//!
//! Authenticated profiles live in the remote profile store and every change
//! is sent as the matching endpoint call. Guest profiles live in the local
//! store and are rewritten whole.

use std::fmt;
use std::sync::Arc;

use crate::profile::{MissionStats, RemoteUserPatch, UserProfile};
use crate::store::{GuestStore, RemoteProfileStore, StoreError};

/// A single change to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileDelta {
    Progress {
        xp: u64,
        completed_missions: u64,
    },
    PlanetUnlocked {
        planet_id: u32,
    },
    MissionCompleted {
        mission_xp: u64,
        stats: Option<MissionStats>,
    },
    Name {
        name: String,
    },
    Avatar {
        avatar_id: String,
    },
    AchievementUnlocked {
        achievement_id: String,
    },
}

impl ProfileDelta {
    fn touches_ledger(&self) -> bool {
        matches!(self, ProfileDelta::AchievementUnlocked { .. })
    }
}

impl fmt::Display for ProfileDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileDelta::Progress { .. } => write!(f, "progress"),
            ProfileDelta::PlanetUnlocked { planet_id } => write!(f, "planet {}", planet_id),
            ProfileDelta::MissionCompleted { mission_xp, .. } => {
                write!(f, "mission (+{} XP)", mission_xp)
            }
            ProfileDelta::Name { .. } => write!(f, "name"),
            ProfileDelta::Avatar { .. } => write!(f, "avatar"),
            ProfileDelta::AchievementUnlocked { achievement_id } => {
                write!(f, "achievement {}", achievement_id)
            }
        }
    }
}

/// What a persisted write reported back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReceipt {
    /// For [`ProfileDelta::AchievementUnlocked`]: whether the owning store
    /// had not recorded the unlock before.
    pub newly_unlocked: bool,
    /// Statistics returned by the remote store, to merge into the profile.
    pub user_patch: Option<RemoteUserPatch>,
}

/// The store owning the current profile.
#[derive(Clone)]
pub enum Backend {
    Remote {
        store: Arc<dyn RemoteProfileStore>,
        access_token: String,
    },
    Local(GuestStore),
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Remote { .. } => f.write_str("Backend::Remote"),
            Backend::Local(_) => f.write_str("Backend::Local"),
        }
    }
}

impl Backend {
    pub fn is_local(&self) -> bool {
        matches!(self, Backend::Local(_))
    }

    /// Persist `delta`. `profile` must already reflect it.
    ///
    /// Local writes never fail: errors are logged and the receipt reports
    /// the write as applied.
    pub async fn persist(
        &self,
        profile: &UserProfile,
        delta: &ProfileDelta,
    ) -> Result<PersistReceipt, StoreError> {
        match self {
            Backend::Local(guests) => {
                let result = if delta.touches_ledger() {
                    guests.save(profile).await
                } else {
                    guests.save_profile(profile).await
                };
                if let Err(e) = result {
                    tracing::error!("Failed to save guest {}: {}", delta, e);
                }
                Ok(PersistReceipt {
                    newly_unlocked: delta.touches_ledger(),
                    user_patch: None,
                })
            }
            Backend::Remote {
                store,
                access_token,
            } => persist_remote(store.as_ref(), access_token, delta).await,
        }
    }
}

async fn persist_remote(
    store: &dyn RemoteProfileStore,
    token: &str,
    delta: &ProfileDelta,
) -> Result<PersistReceipt, StoreError> {
    let mut receipt = PersistReceipt::default();
    match delta {
        ProfileDelta::Progress {
            xp,
            completed_missions,
        } => store.update_progress(token, *xp, *completed_missions).await?,
        ProfileDelta::PlanetUnlocked { planet_id } => {
            store.unlock_planet(token, *planet_id).await?
        }
        ProfileDelta::MissionCompleted { mission_xp, stats } => {
            store.complete_mission(token, *mission_xp).await?;
            if let Some(stats) = stats {
                receipt.user_patch = store.update_mission_stats(token, stats).await?;
            }
        }
        ProfileDelta::Name { name } => store.update_name(token, name).await?,
        ProfileDelta::Avatar { avatar_id } => store.update_avatar(token, avatar_id).await?,
        ProfileDelta::AchievementUnlocked { achievement_id } => {
            receipt.newly_unlocked = store.unlock_achievement(token, achievement_id).await?;
        }
    }
    tracing::debug!("Persisted {} remotely", delta);
    Ok(receipt)
}
