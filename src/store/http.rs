//! HTTP client for the profile edge function.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::{RemoteProfileStore, StoreError, StoreResult};
use crate::achievements::UnlockRecord;
use crate::profile::{MissionStats, RemoteUserPatch, UserProfile};

/// Client for the profile backend (`{supabase}/functions/v1/{function}`).
pub struct HttpProfileStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct ProfilePayload {
    user: UserProfile,
}

#[derive(Deserialize)]
struct AchievementsPayload {
    #[serde(default)]
    achievements: Vec<UnlockRecord>,
}

#[derive(Deserialize)]
struct UnlockPayload {
    #[serde(default, rename = "isNew")]
    is_new: bool,
}

#[derive(Deserialize)]
struct StatsPayload {
    #[serde(default)]
    user: Option<RemoteUserPatch>,
}

#[derive(Deserialize)]
struct Empty {}

impl HttpProfileStore {
    /// Create a new client for the function rooted at `base_url`.
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, path: &str, bearer: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    fn post(&self, path: &str, bearer: &str, body: &Value) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .json(body)
    }

    /// Send a request and unwrap the `{ success, message?, ... }` envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> StoreResult<T> {
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) if status.is_success() => return Err(StoreError::Decode(e)),
            Err(_) => {
                return Err(StoreError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
        };

        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !status.is_success() || !success {
            let message = value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} failed", what));
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!("{} succeeded ({})", what, status);
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl RemoteProfileStore for HttpProfileStore {
    async fn fetch_profile(&self, access_token: &str) -> StoreResult<UserProfile> {
        let payload: ProfilePayload = self
            .send(self.get("profile", access_token), "Fetch profile")
            .await?;
        Ok(payload.user)
    }

    async fn update_progress(
        &self,
        access_token: &str,
        xp: u64,
        completed_missions: u64,
    ) -> StoreResult<()> {
        let body = serde_json::json!({
            "xp": xp,
            "completedMissions": completed_missions
        });
        self.send::<Empty>(
            self.post("update-progress", access_token, &body),
            "Update progress",
        )
        .await?;
        Ok(())
    }

    async fn unlock_planet(&self, access_token: &str, planet_id: u32) -> StoreResult<()> {
        let body = serde_json::json!({ "planetId": planet_id });
        self.send::<Empty>(
            self.post("unlock-planet", access_token, &body),
            "Unlock planet",
        )
        .await?;
        Ok(())
    }

    async fn complete_mission(&self, access_token: &str, mission_xp: u64) -> StoreResult<()> {
        let body = serde_json::json!({ "missionXP": mission_xp });
        self.send::<Empty>(
            self.post("complete-mission", access_token, &body),
            "Complete mission",
        )
        .await?;
        Ok(())
    }

    async fn update_mission_stats(
        &self,
        access_token: &str,
        stats: &MissionStats,
    ) -> StoreResult<Option<RemoteUserPatch>> {
        let body = serde_json::to_value(stats)?;
        let payload: StatsPayload = self
            .send(
                self.post("update-mission-stats", access_token, &body),
                "Update mission stats",
            )
            .await?;
        Ok(payload.user)
    }

    async fn update_name(&self, access_token: &str, name: &str) -> StoreResult<()> {
        let body = serde_json::json!({ "name": name });
        self.send::<Empty>(self.post("update-name", access_token, &body), "Update name")
            .await?;
        Ok(())
    }

    async fn update_avatar(&self, access_token: &str, avatar_id: &str) -> StoreResult<()> {
        let body = serde_json::json!({ "avatarId": avatar_id });
        self.send::<Empty>(
            self.post("update-avatar", access_token, &body),
            "Update avatar",
        )
        .await?;
        Ok(())
    }

    async fn fetch_achievements(&self, access_token: &str) -> StoreResult<Vec<UnlockRecord>> {
        let payload: AchievementsPayload = self
            .send(self.get("achievements", access_token), "Fetch achievements")
            .await?;
        Ok(payload.achievements)
    }

    async fn unlock_achievement(
        &self,
        access_token: &str,
        achievement_id: &str,
    ) -> StoreResult<bool> {
        let body = serde_json::json!({ "achievementId": achievement_id });
        let payload: UnlockPayload = self
            .send(
                self.post("unlock-achievement", access_token, &body),
                "Unlock achievement",
            )
            .await?;
        Ok(payload.is_new)
    }

    async fn signup(&self, username: &str, email: &str, password: &str) -> StoreResult<()> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password
        });
        // Signup happens before there is a user token.
        self.send::<Empty>(self.post("signup", &self.anon_key, &body), "Signup")
            .await?;
        Ok(())
    }

    async fn initialize_user(&self, access_token: &str, username: &str) -> StoreResult<()> {
        let body = serde_json::json!({ "username": username });
        self.send::<Empty>(
            self.post("initialize-user", access_token, &body),
            "Initialize user",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    const TOKEN: &str = "user-token";

    fn bearer_ok(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .map(|h| h == format!("Bearer {}", TOKEN))
            .unwrap_or(false)
    }

    async fn profile(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        if !bearer_ok(&headers) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "Unauthorized" })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "user": {
                    "id": "u-1",
                    "name": "Ada",
                    "email": "ada@example.com",
                    "xp": 1200,
                    "level": 2,
                    "achievements": 1,
                    "completedMissions": 2,
                    "totalMissions": 3,
                    "hasStartedJourney": true,
                    "unlockedPlanets": [1]
                }
            })),
        )
    }

    async fn achievements() -> Json<Value> {
        Json(json!({
            "success": true,
            "achievements": [
                { "achievementId": "first-journey", "unlockedDate": "2024-03-01T12:00:00Z" }
            ]
        }))
    }

    async fn unlock_achievement(Json(body): Json<Value>) -> Json<Value> {
        let is_new = body["achievementId"] != "first-journey";
        Json(json!({ "success": true, "isNew": is_new }))
    }

    async fn mission_stats(Json(body): Json<Value>) -> Json<Value> {
        let perfect = if body["isPerfect"] == true { 1 } else { 0 };
        Json(json!({ "success": true, "user": { "perfectMissions": perfect } }))
    }

    async fn signup(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["email"] == "taken@example.com" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": "User already registered" })),
            );
        }
        (StatusCode::OK, Json(json!({ "success": true })))
    }

    async fn update_name() -> Json<Value> {
        Json(json!({ "success": false, "message": "Name too long" }))
    }

    /// Accept the call only with the user token and exactly `expected` as body.
    fn accept_exact(headers: &HeaderMap, body: &Value, expected: Value) -> (StatusCode, Json<Value>) {
        if !bearer_ok(headers) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "message": "Unauthorized" })),
            );
        }
        if *body != expected {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": format!("unexpected body {}", body) })),
            );
        }
        (StatusCode::OK, Json(json!({ "success": true })))
    }

    async fn update_progress(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        accept_exact(&headers, &body, json!({ "xp": 1500, "completedMissions": 2 }))
    }

    async fn complete_mission(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        accept_exact(&headers, &body, json!({ "missionXP": 250 }))
    }

    async fn initialize_user(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        accept_exact(&headers, &body, json!({ "username": "ada" }))
    }

    async fn update_avatar(headers: HeaderMap, Json(body): Json<Value>) -> Response {
        if body["avatarId"] == "broken" {
            return (StatusCode::BAD_GATEWAY, "upstream down").into_response();
        }
        accept_exact(&headers, &body, json!({ "avatarId": "robot" })).into_response()
    }

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route("/fn/profile", get(profile))
            .route("/fn/achievements", get(achievements))
            .route("/fn/unlock-achievement", post(unlock_achievement))
            .route("/fn/update-mission-stats", post(mission_stats))
            .route("/fn/signup", post(signup))
            .route("/fn/update-name", post(update_name))
            .route("/fn/update-avatar", post(update_avatar))
            .route("/fn/update-progress", post(update_progress))
            .route("/fn/complete-mission", post(complete_mission))
            .route("/fn/initialize-user", post(initialize_user));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/fn/", addr)
    }

    #[tokio::test]
    async fn test_fetch_profile_sends_bearer_token() {
        let base = spawn_backend().await;
        let store = HttpProfileStore::new(&base, "anon");

        let profile = store.fetch_profile(TOKEN).await.unwrap();
        assert_eq!(profile.id, "u-1");
        assert_eq!(profile.stats.completed_missions, 2);
        assert!(!profile.is_guest());

        let err = store.fetch_profile("wrong").await.unwrap_err();
        match err {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_achievement_endpoints() {
        let base = spawn_backend().await;
        let store = HttpProfileStore::new(&base, "anon");

        let records = store.fetch_achievements(TOKEN).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].achievement_id, "first-journey");

        assert!(!store.unlock_achievement(TOKEN, "first-journey").await.unwrap());
        assert!(store.unlock_achievement(TOKEN, "perfectionist").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_mission_stats_returns_patch() {
        let base = spawn_backend().await;
        let store = HttpProfileStore::new(&base, "anon");
        let stats = MissionStats {
            is_perfect: true,
            ..MissionStats::default()
        };
        let patch = store
            .update_mission_stats(TOKEN, &stats)
            .await
            .unwrap()
            .expect("patch returned");
        assert_eq!(patch.perfect_missions, Some(1));
        assert_eq!(patch.xp, None);
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let base = spawn_backend().await;
        let store = HttpProfileStore::new(&base, "anon");

        store
            .signup("ada", "ada@example.com", "secret1")
            .await
            .unwrap();
        let err = store
            .signup("ada", "taken@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.backend_message(), Some("User already registered"));

        let err = store.update_name(TOKEN, "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 200, .. }));

        let err = store.update_avatar(TOKEN, "broken").await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 502, .. }));

        // Unknown route: axum answers 404 with an empty body
        let err = store.unlock_planet(TOKEN, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_write_endpoints_send_expected_bodies() {
        let base = spawn_backend().await;
        let store = HttpProfileStore::new(&base, "anon");

        store.update_progress(TOKEN, 1500, 2).await.unwrap();
        store.complete_mission(TOKEN, 250).await.unwrap();
        store.update_avatar(TOKEN, "robot").await.unwrap();
        store.initialize_user(TOKEN, "ada").await.unwrap();

        // A different body is refused by the stand-in
        let err = store.complete_mission(TOKEN, 251).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 400, .. }));
        let err = store.update_progress("wrong", 1500, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let store = HttpProfileStore::new("http://127.0.0.1:9/fn", "anon");
        let err = store.complete_mission(TOKEN, 100).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
