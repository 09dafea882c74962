//! Configuration management for Kubrick progress sync.
//!
//! Configuration can be set via environment variables:
//! - `SUPABASE_URL` - Optional. Supabase project URL. Without it (and without
//!   `KUBRICK_PROJECT_ID`) only guest mode is available.
//! - `KUBRICK_PROJECT_ID` - Optional. Supabase project id, expanded to
//!   `https://<id>.supabase.co` when `SUPABASE_URL` is unset.
//! - `SUPABASE_ANON_KEY` - Required when a project URL is configured.
//! - `KUBRICK_FUNCTION_NAME` - Optional. Edge function slug. Defaults to `make-server-0eaab711`.
//! - `KUBRICK_DATA_DIR` - Optional. Local store directory. Defaults to `$HOME/.kubrick`.
//! - `KUBRICK_LOCAL_STORE` - Optional. `file` (default) or `memory`.
//! - `KUBRICK_TOTAL_MISSIONS` - Optional. Missions available to new guests. Defaults to `3`.
//! - `KUBRICK_OFFLINE` - Optional. Ignore the remote project and stay in guest mode.

use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::profile::DEFAULT_TOTAL_MISSIONS;
use crate::store::LocalStoreType;
use crate::util::{home_dir, parse_bool};

/// Edge function serving the profile API.
pub const DEFAULT_FUNCTION_NAME: &str = "make-server-0eaab711";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Remote project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Supabase project URL
    pub supabase_url: Url,

    /// Public anon key, sent as `apikey` on every request
    pub anon_key: String,

    /// Edge function slug
    pub function_name: String,
}

impl RemoteConfig {
    /// Project root without a trailing slash.
    pub fn base_url(&self) -> String {
        self.supabase_url.as_str().trim_end_matches('/').to_string()
    }

    /// Base URL of the profile API.
    pub fn functions_url(&self) -> String {
        format!("{}/functions/v1/{}", self.base_url(), self.function_name)
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote project; `None` means guest-only
    pub remote: Option<RemoteConfig>,

    /// Directory for the local key-value store
    pub data_dir: PathBuf,

    /// Local store backend
    pub local_store: LocalStoreType,

    /// Total missions given to a new guest profile
    pub guest_total_missions: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if a project URL is set without
    /// `SUPABASE_ANON_KEY`, and `ConfigError::InvalidValue` for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let offline = var("KUBRICK_OFFLINE")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let project_url = match (var("SUPABASE_URL"), var("KUBRICK_PROJECT_ID")) {
            (Some(url), _) if !url.trim().is_empty() => Some(("SUPABASE_URL", url)),
            (_, Some(id)) if !id.trim().is_empty() => Some((
                "KUBRICK_PROJECT_ID",
                format!("https://{}.supabase.co", id.trim()),
            )),
            _ => None,
        };

        let remote = match project_url {
            Some(_) if offline => {
                tracing::info!("KUBRICK_OFFLINE set, ignoring remote project");
                None
            }
            Some((name, raw)) => {
                let supabase_url = parse_project_url(name, &raw)?;
                let anon_key = var("SUPABASE_ANON_KEY")
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| ConfigError::MissingEnvVar("SUPABASE_ANON_KEY".to_string()))?;
                let function_name = var("KUBRICK_FUNCTION_NAME")
                    .unwrap_or_else(|| DEFAULT_FUNCTION_NAME.to_string());
                Some(RemoteConfig {
                    supabase_url,
                    anon_key,
                    function_name,
                })
            }
            None => None,
        };

        let data_dir = var("KUBRICK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(home_dir()).join(".kubrick"));

        let local_store = var("KUBRICK_LOCAL_STORE")
            .map(|v| LocalStoreType::from_str(&v))
            .unwrap_or_default();

        let guest_total_missions = match var("KUBRICK_TOTAL_MISSIONS") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ConfigError::InvalidValue("KUBRICK_TOTAL_MISSIONS".to_string(), format!("{}", e))
            })?,
            None => DEFAULT_TOTAL_MISSIONS,
        };

        Ok(Self {
            remote,
            data_dir,
            local_store,
            guest_total_missions,
        })
    }

    /// Create a guest-only config (useful for testing).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            remote: None,
            data_dir,
            local_store: LocalStoreType::File,
            guest_total_missions: DEFAULT_TOTAL_MISSIONS,
        }
    }
}

fn parse_project_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("unsupported scheme '{}'", other),
        )),
    }
}
