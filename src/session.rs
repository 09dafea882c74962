//! The progress session.
//!
//! A [`Session`] owns the signed-in user's profile and unlock ledger, routes
//! every change to the store that owns the profile, and re-runs the
//! achievement rules after each change.
//!
//! # Session modes
//!
//! ```text
//! unauthenticated --login/register/restore--> authenticated
//! unauthenticated --login_as_guest----------> guest
//! authenticated | guest --logout------------> unauthenticated
//! ```
//!
//! There is no direct transition between `authenticated` and `guest`.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::achievements::{self, AchievementRule, Ledger, Progress, UnlockRecord};
use crate::auth::{AuthError, AuthSession, IdentityProvider, SupabaseAuth};
use crate::backend::{Backend, PersistReceipt, ProfileDelta};
use crate::config::Config;
use crate::profile::{MissionStats, ProfileMode, UserProfile};
use crate::store::{
    create_local_store, GuestStore, HttpProfileStore, RemoteProfileStore, StoreError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Unauthenticated,
    Authenticated,
    Guest,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Unauthenticated => write!(f, "unauthenticated"),
            SessionMode::Authenticated => write!(f, "authenticated"),
            SessionMode::Guest => write!(f, "guest"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionMode, to: SessionMode },

    #[error("Online accounts are not configured")]
    NotConfigured,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Conta criada, mas houve um erro ao fazer login. Tente fazer login manualmente ou use o modo convidado.")]
    AccountCreatedLoginFailed,

    #[error("Sua conta foi criada, mas não foi possível ativá-la automaticamente. Use o modo convidado enquanto isso.")]
    ActivationPending,

    #[error("Conta criada, mas houve um erro ao inicializar seus dados. Tente fazer login.")]
    InitializationFailed,

    #[error("{0}")]
    Backend(String),
}

/// Fallback message when the profile backend fails without saying why.
const BACKEND_UNAVAILABLE: &str =
    "Não foi possível criar sua conta no momento. Por favor, use o modo convidado para experimentar o jogo!";

/// Services needed for authenticated mode.
#[derive(Clone)]
pub struct RemoteServices {
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn RemoteProfileStore>,
}

/// One catalog rule with the user's progress towards it.
#[derive(Debug, Clone)]
pub struct AchievementStatus<'a> {
    pub rule: &'static AchievementRule,
    pub progress: Progress,
    pub unlocked: Option<&'a UnlockRecord>,
}

pub struct Session {
    mode: SessionMode,
    remote: Option<RemoteServices>,
    guests: GuestStore,
    guest_total_missions: u64,
    backend: Option<Backend>,
    profile: Option<UserProfile>,
}

fn is_already_registered(err: &StoreError) -> bool {
    err.backend_message()
        .map(|m| matches!(AuthError::classify(m), AuthError::AlreadyRegistered))
        .unwrap_or(false)
}

fn is_authorization_failure(err: &StoreError) -> bool {
    match err {
        StoreError::Rejected { status, message } => {
            *status == 401 || message.to_lowercase().contains("authorization")
        }
        StoreError::Status { status, .. } => *status == 401,
        _ => false,
    }
}

impl Session {
    pub fn new(remote: Option<RemoteServices>, guests: GuestStore, guest_total_missions: u64) -> Self {
        Self {
            mode: SessionMode::Unauthenticated,
            remote,
            guests,
            guest_total_missions,
            backend: None,
            profile: None,
        }
    }

    /// Build a session with the stores described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, StoreError> {
        let kv = create_local_store(config.local_store, config.data_dir.clone()).await?;
        if !kv.is_persistent() {
            tracing::warn!("Using non-persistent local store; guest progress will be lost on exit");
        }

        let remote = config.remote.as_ref().map(|remote| {
            let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseAuth::new(
                &remote.base_url(),
                &remote.anon_key,
                kv.clone(),
            ));
            let profiles: Arc<dyn RemoteProfileStore> = Arc::new(HttpProfileStore::new(
                &remote.functions_url(),
                &remote.anon_key,
            ));
            RemoteServices { identity, profiles }
        });

        Ok(Self::new(
            remote,
            GuestStore::new(kv),
            config.guest_total_missions,
        ))
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        self.profile.as_ref().map(|p| &p.ledger)
    }

    /// Whether authenticated mode can be entered at all.
    pub fn online_available(&self) -> bool {
        self.remote.is_some()
    }

    fn check_transition(&self, to: SessionMode) -> Result<(), SessionError> {
        if self.mode != SessionMode::Unauthenticated {
            return Err(SessionError::InvalidTransition {
                from: self.mode,
                to,
            });
        }
        Ok(())
    }

    fn remote_services(&self) -> Result<RemoteServices, SessionError> {
        self.remote.clone().ok_or(SessionError::NotConfigured)
    }

    // ==================== Transitions ====================

    /// Resume a stored identity-provider session.
    ///
    /// Returns `false` when there is nothing to resume.
    pub async fn restore(&mut self) -> Result<bool, SessionError> {
        self.check_transition(SessionMode::Authenticated)?;
        let Some(remote) = self.remote.clone() else {
            return Ok(false);
        };

        let session = match remote.identity.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!("Could not read stored session: {}", e);
                return Ok(false);
            }
        };

        self.adopt_session(&remote, session).await?;
        Ok(true)
    }

    /// Resume the stored account, falling back to the local guest.
    ///
    /// A stored session the backend no longer accepts is not fatal: the user
    /// continues as a guest and can sign in again.
    pub async fn resume_or_guest(&mut self) -> Result<SessionMode, SessionError> {
        match self.restore().await {
            Ok(true) => return Ok(self.mode),
            Ok(false) => {}
            Err(e @ SessionError::InvalidTransition { .. }) => return Err(e),
            Err(e) => tracing::warn!("Could not resume stored session, continuing as guest: {}", e),
        }
        self.login_as_guest().await?;
        Ok(self.mode)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), SessionError> {
        self.check_transition(SessionMode::Authenticated)?;
        let remote = self.remote_services()?;
        self.sign_in(&remote, email, password).await
    }

    /// Create an account and sign in.
    ///
    /// The profile backend's signup is tried first since it confirms the email
    /// itself; the identity provider's own sign-up is the fallback.
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        self.check_transition(SessionMode::Authenticated)?;
        let remote = self.remote_services()?;

        match remote.profiles.signup(username, email, password).await {
            Ok(()) => {
                tracing::info!("Account created by profile backend, signing in");
                return self
                    .sign_in(&remote, email, password)
                    .await
                    .map_err(|e| {
                        tracing::warn!("Sign-in after signup failed: {}", e);
                        SessionError::AccountCreatedLoginFailed
                    });
            }
            Err(e) if is_already_registered(&e) => {
                return Err(AuthError::AlreadyRegistered.into());
            }
            Err(e) => {
                tracing::warn!("Backend signup failed, falling back to provider: {}", e);
            }
        }

        let outcome = remote.identity.sign_up(email, password, username).await?;

        let Some(session) = outcome.session else {
            if outcome.user_id.is_none() {
                return Err(SessionError::Backend(
                    "Erro ao criar conta. Use o modo convidado para experimentar o jogo.".to_string(),
                ));
            }
            return self
                .finish_unconfirmed_signup(&remote, username, email, password)
                .await;
        };

        if let Err(e) = remote
            .profiles
            .initialize_user(&session.access_token, username)
            .await
        {
            tracing::error!("Failed to initialize user data: {}", e);
            return Err(SessionError::InitializationFailed);
        }

        self.adopt_session(&remote, session).await
    }

    /// The provider created the user but wants an email confirmation; ask
    /// the backend to create (and confirm) the account again, then sign in.
    async fn finish_unconfirmed_signup(
        &mut self,
        remote: &RemoteServices,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        match remote.profiles.signup(username, email, password).await {
            Ok(()) => self
                .sign_in(remote, email, password)
                .await
                .map_err(|_| SessionError::AccountCreatedLoginFailed),
            Err(e) if is_authorization_failure(&e) => {
                tracing::info!("Backend refused signup retry, trying direct sign-in");
                self.sign_in(remote, email, password)
                    .await
                    .map_err(|_| SessionError::ActivationPending)
            }
            Err(e) => {
                if is_already_registered(&e) && self.sign_in(remote, email, password).await.is_ok()
                {
                    return Ok(());
                }
                Err(SessionError::Backend(
                    e.backend_message().unwrap_or(BACKEND_UNAVAILABLE).to_string(),
                ))
            }
        }
    }

    async fn sign_in(
        &mut self,
        remote: &RemoteServices,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let session = remote.identity.sign_in_with_password(email, password).await?;
        self.adopt_session(remote, session).await
    }

    /// Load the profile and ledger for `session` and enter authenticated mode.
    async fn adopt_session(
        &mut self,
        remote: &RemoteServices,
        session: AuthSession,
    ) -> Result<(), SessionError> {
        let token = session.access_token;

        let mut profile = remote
            .profiles
            .fetch_profile(&token)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch profile: {}", e);
                SessionError::Backend(e.to_string())
            })?;
        profile.mode = ProfileMode::Authenticated;

        let ledger = match remote.profiles.fetch_achievements(&token).await {
            Ok(records) => Ledger::from_records(records),
            Err(e) => {
                tracing::warn!("Failed to load achievements: {}", e);
                Ledger::new()
            }
        };
        profile.set_ledger(ledger);

        tracing::info!(
            "Signed in as {} ({} achievements)",
            profile.id,
            profile.achievement_count()
        );
        self.backend = Some(Backend::Remote {
            store: remote.profiles.clone(),
            access_token: token,
        });
        self.profile = Some(profile);
        self.mode = SessionMode::Authenticated;
        Ok(())
    }

    /// Enter guest mode, resuming the stored guest if there is one.
    pub async fn login_as_guest(&mut self) -> Result<(), SessionError> {
        self.check_transition(SessionMode::Guest)?;

        let stored = match self.guests.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to read stored guest: {}", e);
                None
            }
        };

        let profile = match stored {
            Some(mut profile) => {
                profile.mode = ProfileMode::Guest;
                profile.sync_achievement_counter();
                tracing::info!("Resumed guest {}", profile.id);
                profile
            }
            None => {
                let profile = UserProfile::new_guest(
                    Utc::now().timestamp_millis(),
                    self.guest_total_missions,
                );
                if let Err(e) = self.guests.save(&profile).await {
                    tracing::error!("Failed to save new guest: {}", e);
                }
                tracing::info!("Created guest {}", profile.id);
                profile
            }
        };

        self.backend = Some(Backend::Local(self.guests.clone()));
        self.profile = Some(profile);
        self.mode = SessionMode::Guest;
        Ok(())
    }

    /// Leave the current mode. Guests forget their local progress.
    pub async fn logout(&mut self) {
        match self.mode {
            SessionMode::Unauthenticated => return,
            SessionMode::Authenticated => {
                if let Some(remote) = &self.remote {
                    if let Err(e) = remote.identity.sign_out().await {
                        tracing::warn!("Sign-out failed: {}", e);
                    }
                }
            }
            SessionMode::Guest => {
                if let Err(e) = self.guests.clear().await {
                    tracing::warn!("Failed to clear guest data: {}", e);
                }
            }
        }

        tracing::info!("Logged out of {} session", self.mode);
        self.mode = SessionMode::Unauthenticated;
        self.backend = None;
        self.profile = None;
    }

    // ==================== Profile updates ====================

    async fn persist(&self, delta: &ProfileDelta) -> Option<PersistReceipt> {
        let backend = self.backend.as_ref()?;
        let profile = self.profile.as_ref()?;
        match backend.persist(profile, delta).await {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                tracing::error!("Failed to persist {}: {}", delta, e);
                None
            }
        }
    }

    /// Overwrite XP and completed missions, then check achievements.
    pub async fn update_user_progress(&mut self, xp: u64, completed_missions: u64) -> Vec<String> {
        let Some(profile) = self.profile.as_mut() else {
            return Vec::new();
        };
        profile.stats.xp = xp;
        profile.stats.completed_missions = completed_missions;

        self.persist(&ProfileDelta::Progress {
            xp,
            completed_missions,
        })
        .await;
        self.check_achievements().await
    }

    pub async fn unlock_planet(&mut self, planet_id: u32) -> Vec<String> {
        let Some(profile) = self.profile.as_mut() else {
            return Vec::new();
        };
        if profile.stats.unlock_planet(planet_id) {
            tracing::info!("Unlocked planet {}", planet_id);
        }

        self.persist(&ProfileDelta::PlanetUnlocked { planet_id })
            .await;
        self.check_achievements().await
    }

    /// Record a finished mission and return the achievements it unlocked.
    pub async fn complete_mission(
        &mut self,
        mission_xp: u64,
        stats: Option<MissionStats>,
    ) -> Vec<String> {
        let Some(profile) = self.profile.as_mut() else {
            return Vec::new();
        };
        profile.stats.record_mission(mission_xp, stats.as_ref());
        profile.has_started_journey = true;

        let receipt = self
            .persist(&ProfileDelta::MissionCompleted { mission_xp, stats })
            .await;
        if let (Some(patch), Some(profile)) = (
            receipt.and_then(|r| r.user_patch),
            self.profile.as_mut(),
        ) {
            profile.merge_remote(patch);
        }

        self.check_achievements().await
    }

    pub async fn update_user_name(&mut self, name: &str) {
        let Some(profile) = self.profile.as_mut() else {
            return;
        };
        profile.name = name.to_string();
        self.persist(&ProfileDelta::Name {
            name: name.to_string(),
        })
        .await;
    }

    pub async fn update_user_avatar(&mut self, avatar_id: &str) {
        let Some(profile) = self.profile.as_mut() else {
            return;
        };
        profile.avatar = Some(avatar_id.to_string());
        self.persist(&ProfileDelta::Avatar {
            avatar_id: avatar_id.to_string(),
        })
        .await;
    }

    // ==================== Achievements ====================

    pub fn is_achievement_unlocked(&self, achievement_id: &str) -> bool {
        self.profile
            .as_ref()
            .map(|p| p.ledger.is_unlocked(achievement_id))
            .unwrap_or(false)
    }

    /// Unlock one achievement.
    ///
    /// Returns `true` only if the unlock is new for the owning store. A remote
    /// failure returns `false` but the unlock stays in the in-memory ledger.
    pub async fn unlock_achievement(&mut self, achievement_id: &str) -> bool {
        let Some(profile) = self.profile.as_mut() else {
            return false;
        };
        if achievements::get_by_id(achievement_id).is_none() {
            tracing::warn!("Ignoring unlock of unknown achievement {}", achievement_id);
            return false;
        }
        if !profile.ledger.record_unlock(achievement_id, Utc::now()) {
            return false;
        }
        profile.sync_achievement_counter();

        self.persist(&ProfileDelta::AchievementUnlocked {
            achievement_id: achievement_id.to_string(),
        })
        .await
        .map(|receipt| receipt.newly_unlocked)
        .unwrap_or(false)
    }

    /// Evaluate every locked rule against the current statistics and unlock
    /// the satisfied ones. Returns the newly unlocked ids in catalog order.
    pub async fn check_achievements(&mut self) -> Vec<String> {
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };

        let stats = profile.stats.clone();
        let satisfied: Vec<&'static str> = achievements::catalog()
            .iter()
            .filter(|rule| !profile.ledger.is_unlocked(&rule.id))
            .filter(|rule| achievements::evaluate(rule, &stats).is_unlocked)
            .map(|rule| rule.id.as_str())
            .collect();

        let mut newly_unlocked = Vec::new();
        for id in satisfied {
            if self.unlock_achievement(id).await {
                tracing::info!("Achievement unlocked: {}", id);
                newly_unlocked.push(id.to_string());
            }
        }
        newly_unlocked
    }

    /// Every catalog rule with the current progress, in catalog order.
    pub fn achievement_statuses(&self) -> Vec<AchievementStatus<'_>> {
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };
        achievements::catalog()
            .iter()
            .map(|rule| AchievementStatus {
                rule,
                progress: achievements::evaluate(rule, &profile.stats),
                unlocked: profile
                    .ledger
                    .records()
                    .iter()
                    .find(|r| r.achievement_id == rule.id),
            })
            .collect()
    }
}
