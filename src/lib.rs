//! # Kubrick progress
//!
//! Achievement evaluation and progress synchronization for the Kubrick
//! geometry-learning game.
//!
//! This library provides:
//! - A static catalog of achievement rules and a pure evaluator
//! - An append-only unlock ledger per user
//! - A session that applies profile changes, persists them to the store
//!   that owns the profile, and unlocks satisfied achievements
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │           Session            │
//!            │ (mode, profile, ledger)      │
//!            └───────┬──────────────┬───────┘
//!                    │              │
//!         evaluate   │              │ persist(delta)
//!                    ▼              ▼
//!        ┌────────────────┐   ┌────────────────────────┐
//!        │  achievements  │   │        Backend         │
//!        │ catalog/ledger │   │ Remote (HTTP) | Local  │
//!        └────────────────┘   └────────────────────────┘
//! ```
//!
//! ## Modules
//! - `achievements`: rule catalog, evaluator and ledger
//! - `profile`: user profile and statistics
//! - `store`: remote profile API and local key-value stores
//! - `auth`: identity provider (password sign-in and sign-up)
//! - `backend`: routes profile writes by session mode
//! - `session`: the progress coordinator

pub mod achievements;
pub mod auth;
pub mod backend;
pub mod config;
pub mod profile;
pub mod session;
pub mod store;
pub mod util;

pub use config::Config;
pub use profile::{MissionStats, UserProfile, UserStats};
pub use session::{Session, SessionError, SessionMode};
