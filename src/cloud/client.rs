use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{FetchLayoutRequest, FetchLayoutResponse, SaveLayoutRequest, SaveLayoutResponse};
use crate::engine::layout_store::RemoteLayoutStore;
use crate::error::AppError;

// ============================================================================
// Helper
// ============================================================================

/// Convert any displayable error into `AppError::Remote`.
fn cloud_err(e: impl std::fmt::Display) -> AppError {
    AppError::Remote(e.to_string())
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CanvasHealthResponse {
    pub status: String,
}

// ============================================================================
// CanvasCloudClient
// ============================================================================

/// HTTP client for the hosted canvas layout endpoints.
pub struct CanvasCloudClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CanvasCloudClient {
    /// Create a client for the given backend base URL and API key.
    ///
    /// The underlying `reqwest::Client` is configured with a 30-second timeout.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(cloud_err)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    // --------------------------------------------------------------------
    // Private HTTP helpers
    // --------------------------------------------------------------------

    /// Build an authenticated request to the given endpoint path.
    fn authed(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    /// Send a request, check the status code, and deserialize the JSON response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        req.send()
            .await
            .map_err(cloud_err)?
            .error_for_status()
            .map_err(cloud_err)?
            .json()
            .await
            .map_err(cloud_err)
    }

    // --------------------------------------------------------------------
    // Endpoints
    // --------------------------------------------------------------------

    /// `GET /health` -- basic health check.
    pub async fn health(&self) -> Result<CanvasHealthResponse, AppError> {
        self.send_json(self.authed(reqwest::Method::GET, "/health")).await
    }

    /// `GET /api/canvas/layout?userId=&workspaceId=` -- saved layout plus team roster.
    pub async fn get_layout(&self, request: &FetchLayoutRequest) -> Result<FetchLayoutResponse, AppError> {
        let mut query = vec![("userId", request.user_id.as_str())];
        if let Some(ws) = request.workspace_id.as_deref() {
            query.push(("workspaceId", ws));
        }
        let req = self
            .authed(reqwest::Method::GET, "/api/canvas/layout")
            .query(&query);
        self.send_json(req).await
    }

    /// `POST /api/canvas/layout` -- persist positions, connections and view in one payload.
    pub async fn post_layout(&self, request: &SaveLayoutRequest) -> Result<SaveLayoutResponse, AppError> {
        let req = self
            .authed(reqwest::Method::POST, "/api/canvas/layout")
            .json(request);
        self.send_json(req).await
    }
}

#[async_trait]
impl RemoteLayoutStore for CanvasCloudClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_layout(&self, request: FetchLayoutRequest) -> Result<FetchLayoutResponse, AppError> {
        tracing::debug!(workspace = ?request.workspace_id, "GET canvas layout");
        self.get_layout(&request).await
    }

    async fn save_layout(&self, request: SaveLayoutRequest) -> Result<SaveLayoutResponse, AppError> {
        tracing::debug!(
            workspace = ?request.workspace_id,
            positions = request.positions.len(),
            connections = request.connections.len(),
            "POST canvas layout"
        );
        self.post_layout(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CanvasLayout, TeamPosition};
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Saved = Arc<Mutex<Option<CanvasLayout>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "Bearer test-key")
            .unwrap_or(false)
    }

    async fn fetch(
        State(saved): State<Saved>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<FetchLayoutResponse>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let layout = saved
            .lock()
            .unwrap()
            .clone()
            .filter(|l| l.workspace_id.as_deref() == params.get("workspaceId").map(String::as_str));
        Ok(Json(FetchLayoutResponse {
            success: true,
            layout,
            teams: Some(vec!["a".into(), "b".into()]),
            error: None,
        }))
    }

    async fn save(
        State(saved): State<Saved>,
        headers: HeaderMap,
        Json(request): Json<SaveLayoutRequest>,
    ) -> Result<Json<SaveLayoutResponse>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let response = SaveLayoutResponse {
            success: true,
            positions_saved: request.positions.len() as u32,
            connections_saved: request.connections.len() as u32,
            saved_at: Some(request.updated_at),
            error: None,
            validation_errors: Vec::new(),
        };
        *saved.lock().unwrap() = Some(CanvasLayout {
            user_id: request.user_id,
            workspace_id: request.workspace_id,
            positions: request.positions,
            connections: request.connections,
            view: request.view,
            updated_at: request.updated_at,
        });
        Ok(Json(response))
    }

    async fn spawn_backend() -> String {
        let saved: Saved = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route("/health", get(|| async { Json(CanvasHealthResponse { status: "ok".into() }) }))
            .route("/api/canvas/layout", get(fetch).post(save))
            .with_state(saved);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn save_then_fetch_over_http() {
        let base = spawn_backend().await;
        let client = CanvasCloudClient::new(format!("{base}/"), "test-key").unwrap();
        assert_eq!(client.health().await.unwrap().status, "ok");

        let now = Utc::now();
        let request = SaveLayoutRequest {
            user_id: "user-1".into(),
            workspace_id: Some("ws".into()),
            positions: vec![TeamPosition::new("a", 50.0, 50.0, now)],
            connections: Vec::new(),
            view: Default::default(),
            updated_at: now,
        };
        let saved = client.save_layout(request).await.unwrap();
        assert!(saved.success);
        assert_eq!(saved.positions_saved, 1);

        let fetched = client
            .fetch_layout(FetchLayoutRequest {
                user_id: "user-1".into(),
                workspace_id: Some("ws".into()),
            })
            .await
            .unwrap();
        let layout = fetched.layout.unwrap();
        assert_eq!(layout.positions[0].team_id, "a");
        assert_eq!(fetched.teams.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn bad_key_is_a_remote_error() {
        let base = spawn_backend().await;
        let client = CanvasCloudClient::new(base, "wrong").unwrap();
        let err = client
            .fetch_layout(FetchLayoutRequest {
                user_id: "user-1".into(),
                workspace_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Remote(ref m) if m.contains("401")));
    }
}
