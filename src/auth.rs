//! Identity provider: password sign-in, sign-up and the persisted session.
//!
//! [`SupabaseAuth`] talks to a GoTrue-compatible auth API and keeps the last
//! successful session in the local key-value store so a restart can pick it
//! up again.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::{KeyValueStore, StoreError};

/// Local store key holding the persisted session.
pub const SESSION_KEY: &str = "kubrick.auth.session";

/// Sessions this close to expiry (seconds) are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Este email já está cadastrado")]
    AlreadyRegistered,

    #[error("Email inválido")]
    InvalidEmail,

    #[error("A senha deve ter pelo menos 6 caracteres")]
    WeakPassword,

    #[error("Email ou senha incorretos")]
    InvalidCredentials,

    #[error("{0}")]
    Provider(String),

    #[error("Auth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode auth response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to persist session: {0}")]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Classify a provider error message by the known phrases it contains.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("already registered")
            || lower.contains("already exists")
            || lower.contains("já está cadastrado")
        {
            AuthError::AlreadyRegistered
        } else if lower.contains("invalid login credentials") {
            AuthError::InvalidCredentials
        } else if lower.contains("invalid email") {
            AuthError::InvalidEmail
        } else if lower.contains("password") {
            AuthError::WeakPassword
        } else {
            AuthError::Provider(message.to_string())
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) after which the access token is invalid.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now + EXPIRY_MARGIN_SECS)
    }
}

/// Result of a sign-up: the provider may create the user without a session
/// when email confirmation is pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user_id: Option<String>,
    pub session: Option<AuthSession>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The current session, if one is stored and still usable.
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AuthError>;

    /// End the current session. The stored session is forgotten even when the
    /// provider call fails.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

#[derive(Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user_id: self.user.id,
            email: self.user.email,
        }
    }
}

/// Pull the human-readable message out of a GoTrue error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["msg", "error_description", "message", "error"]
                .iter()
                .find_map(|field| value.get(*field).and_then(Value::as_str))
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

/// GoTrue-compatible identity provider.
pub struct SupabaseAuth {
    client: Client,
    url: String,
    anon_key: String,
    kv: Arc<dyn KeyValueStore>,
}

impl SupabaseAuth {
    pub fn new(url: &str, anon_key: &str, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            kv,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.url, path)
    }

    async fn post_json(&self, path: &str, bearer: &str, body: &Value) -> Result<Value, AuthError> {
        let resp = self
            .client
            .post(self.auth_url(path))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = error_message(&text);
            tracing::debug!("Auth request {} failed: {} - {}", path, status, message);
            return Err(AuthError::classify(&message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn store_session(&self, session: &AuthSession) -> Result<(), AuthError> {
        let raw = serde_json::to_string(session)?;
        self.kv.set(SESSION_KEY, &raw).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AuthError> {
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let value = self
            .post_json("token?grant_type=refresh_token", &self.anon_key, &body)
            .await?;
        let session = serde_json::from_value::<TokenResponse>(value)?.into_session();
        self.store_session(&session).await?;
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        let Some(raw) = self.kv.get(SESSION_KEY).await? else {
            return Ok(None);
        };

        let session: AuthSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable stored session: {}", e);
                self.kv.remove(SESSION_KEY).await?;
                return Ok(None);
            }
        };

        if !session.is_expired_at(Utc::now().timestamp()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.as_deref() else {
            self.kv.remove(SESSION_KEY).await?;
            return Ok(None);
        };

        match self.refresh(refresh_token).await {
            Ok(refreshed) => {
                tracing::info!("Refreshed session for user {}", refreshed.user_id);
                Ok(Some(refreshed))
            }
            Err(e) => {
                tracing::warn!("Session refresh failed, signing out locally: {}", e);
                self.kv.remove(SESSION_KEY).await?;
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let value = self
            .post_json("token?grant_type=password", &self.anon_key, &body)
            .await?;
        let session = serde_json::from_value::<TokenResponse>(value)?.into_session();
        self.store_session(&session).await?;
        tracing::info!("Signed in as {}", session.user_id);
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<SignUpOutcome, AuthError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "username": username }
        });
        let value = self.post_json("signup", &self.anon_key, &body).await?;

        // With auto-confirm the provider answers with a full session,
        // otherwise with the bare user object.
        if value.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(value)?.into_session();
            self.store_session(&session).await?;
            return Ok(SignUpOutcome {
                user_id: Some(session.user_id.clone()),
                session: Some(session),
            });
        }

        let user = value.get("user").unwrap_or(&value);
        let user_id = user.get("id").and_then(Value::as_str).map(str::to_string);
        Ok(SignUpOutcome {
            user_id,
            session: None,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let stored = self.kv.get(SESSION_KEY).await?;
        self.kv.remove(SESSION_KEY).await?;

        let Some(session) = stored.and_then(|raw| serde_json::from_str::<AuthSession>(&raw).ok())
        else {
            return Ok(());
        };

        self.post_json("logout", &session.access_token, &Value::Null)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKeyValueStore;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn token_body(access: &str, expires_in: i64) -> Value {
        json!({
            "access_token": access,
            "token_type": "bearer",
            "expires_in": expires_in,
            "refresh_token": "refresh-1",
            "user": { "id": "u-1", "email": "ada@example.com" }
        })
    }

    async fn token(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        match params.get("grant_type").map(String::as_str) {
            Some("password") if body["password"] == "secret1" => {
                (StatusCode::OK, Json(token_body("access-1", 3600)))
            }
            Some("password") => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
            ),
            Some("refresh_token") if body["refresh_token"] == "refresh-1" => {
                (StatusCode::OK, Json(token_body("access-2", 3600)))
            }
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "msg": "Invalid Refresh Token" })),
            ),
        }
    }

    async fn signup(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        match body["email"].as_str() {
            Some("taken@example.com") => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "code": 422, "msg": "User already registered" })),
            ),
            Some("pending@example.com") => (
                StatusCode::OK,
                Json(json!({ "id": "u-pending", "email": "pending@example.com" })),
            ),
            _ => (StatusCode::OK, Json(token_body("access-new", 3600))),
        }
    }

    async fn logout(headers: HeaderMap) -> StatusCode {
        match headers.get("authorization").and_then(|h| h.to_str().ok()) {
            Some("Bearer access-1") => StatusCode::NO_CONTENT,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    async fn spawn_provider() -> String {
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/logout", post(logout));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn kv() -> Arc<InMemoryKeyValueStore> {
        Arc::new(InMemoryKeyValueStore::new())
    }

    #[test]
    fn test_classify() {
        assert!(matches!(
            AuthError::classify("User already registered"),
            AuthError::AlreadyRegistered
        ));
        assert!(matches!(
            AuthError::classify("A user with this email already exists"),
            AuthError::AlreadyRegistered
        ));
        assert!(matches!(
            AuthError::classify("Este email já está cadastrado"),
            AuthError::AlreadyRegistered
        ));
        assert!(matches!(
            AuthError::classify("Unable to validate email address: invalid email"),
            AuthError::InvalidEmail
        ));
        assert!(matches!(
            AuthError::classify("Password should be at least 6 characters"),
            AuthError::WeakPassword
        ));
        assert!(matches!(
            AuthError::classify("Invalid login credentials"),
            AuthError::InvalidCredentials
        ));
        match AuthError::classify("Email rate limit exceeded") {
            AuthError::Provider(message) => assert_eq!(message, "Email rate limit exceeded"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_session_expiry() {
        let mut session = AuthSession {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: None,
            user_id: "u".to_string(),
            email: None,
        };
        assert!(!session.is_expired_at(i64::MAX - EXPIRY_MARGIN_SECS));
        session.expires_at = Some(1_000);
        assert!(session.is_expired_at(1_000));
        assert!(session.is_expired_at(1_000 - EXPIRY_MARGIN_SECS));
        assert!(!session.is_expired_at(1_000 - EXPIRY_MARGIN_SECS - 1));
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let url = spawn_provider().await;
        let store = kv();
        let auth = SupabaseAuth::new(&url, "anon", store.clone());

        assert!(auth.get_session().await.unwrap().is_none());

        let err = auth
            .sign_in_with_password("ada@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let session = auth
            .sign_in_with_password("ada@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(session.access_token, "access-1");
        assert_eq!(session.user_id, "u-1");
        assert!(session.expires_at.is_some());

        // A second provider over the same store sees the session
        let again = SupabaseAuth::new(&url, "anon", store.clone());
        assert_eq!(again.get_session().await.unwrap(), Some(session));

        again.sign_out().await.unwrap();
        assert!(store.get(SESSION_KEY).await.unwrap().is_none());
        assert!(auth.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let url = spawn_provider().await;
        let store = kv();
        let stale = AuthSession {
            access_token: "stale".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(0),
            user_id: "u-1".to_string(),
            email: None,
        };
        store
            .set(SESSION_KEY, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();

        let auth = SupabaseAuth::new(&url, "anon", store.clone());
        let session = auth.get_session().await.unwrap().expect("refreshed");
        assert_eq!(session.access_token, "access-2");

        // Unrefreshable sessions are dropped
        let dead = AuthSession {
            refresh_token: Some("revoked".to_string()),
            ..stale
        };
        store
            .set(SESSION_KEY, &serde_json::to_string(&dead).unwrap())
            .await
            .unwrap();
        assert!(auth.get_session().await.unwrap().is_none());
        assert!(store.get(SESSION_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_outcomes() {
        let url = spawn_provider().await;
        let store = kv();
        let auth = SupabaseAuth::new(&url, "anon", store.clone());

        let outcome = auth
            .sign_up("pending@example.com", "secret1", "pending")
            .await
            .unwrap();
        assert_eq!(outcome.user_id.as_deref(), Some("u-pending"));
        assert!(outcome.session.is_none());
        assert!(store.get(SESSION_KEY).await.unwrap().is_none());

        let outcome = auth
            .sign_up("new@example.com", "secret1", "new")
            .await
            .unwrap();
        assert_eq!(
            outcome.session.map(|s| s.access_token).as_deref(),
            Some("access-new")
        );
        assert!(store.get(SESSION_KEY).await.unwrap().is_some());

        let err = auth
            .sign_up("taken@example.com", "secret1", "taken")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_corrupt_stored_session() {
        let store = kv();
        store.set(SESSION_KEY, "{oops").await.unwrap();
        let auth = SupabaseAuth::new("http://127.0.0.1:9", "anon", store.clone());
        assert!(auth.get_session().await.unwrap().is_none());
        assert!(store.get(SESSION_KEY).await.unwrap().is_none());
        // Nothing stored, nothing to revoke
        auth.sign_out().await.unwrap();
    }
}
