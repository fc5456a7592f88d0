use crate::call::{Caller, RequestSpec};
use crate::settings::Defaults;
use crate::utils::MAX_BODY_BYTES;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared, read-only state. Settings are re-read per request so edits to
/// the file apply without a restart.
#[derive(Debug, Clone)]
pub struct AppState {
    caller: Arc<Caller>,
    settings_path: String,
    profile: Option<String>,
}

impl AppState {
    pub fn new(caller: Caller, settings_path: &str, profile: Option<&str>) -> Self {
        AppState {
            caller: Arc::new(caller),
            settings_path: settings_path.to_string(),
            profile: profile.map(str::to_string),
        }
    }

    fn load_defaults(&self) -> Defaults {
        Defaults::load(&self.settings_path, self.profile.as_deref()).unwrap_or_else(|e| {
            warn!("ignoring unreadable settings: {e:#}");
            Defaults::default()
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/call", post(call_api))
        .route("/api/config", get(config_api))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("curlport listening on http://{addr}");
    }
    axum::serve(listener, app(state)).await
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn call_api(State(state): State<AppState>, body: Bytes) -> Response {
    let spec = if body.is_empty() {
        RequestSpec::default()
    } else {
        match serde_json::from_slice::<RequestSpec>(&body) {
            Ok(spec) => spec,
            Err(_) => return error_json(StatusCode::BAD_REQUEST, "Invalid JSON request body."),
        }
    };

    let defaults = state.load_defaults();
    let result = state.caller.call(&spec, &defaults).await;
    let status =
        StatusCode::from_u16(result.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(result)).into_response()
}

async fn config_api(State(state): State<AppState>) -> Response {
    let summary = state.load_defaults().summary();
    Json(json!({ "config": summary })).into_response()
}

async fn not_found() -> Response {
    error_json(StatusCode::NOT_FOUND, "Not found.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn state_with_settings(content: &str, curl: &str) -> (AppState, tempfile::TempPath) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.into_temp_path();
        let state = AppState::new(Caller::new(curl), path.to_str().unwrap(), None);
        (state, path)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn call_requires_url_template() {
        let (state, _path) = state_with_settings("", "curl");
        let resp = app(state).oneshot(json_request("/api/call", "{}")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "URL template is required.");
        assert!(json.get("request").is_none());
    }

    #[tokio::test]
    async fn call_treats_empty_body_as_empty_object() {
        let (state, _path) = state_with_settings("", "curl");
        let resp = app(state).oneshot(json_request("/api/call", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "URL template is required.");
    }

    #[tokio::test]
    async fn call_rejects_invalid_json() {
        let (state, _path) = state_with_settings("", "curl");
        let resp = app(state)
            .oneshot(json_request("/api/call", "{not json"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Invalid JSON request body.");
    }

    #[tokio::test]
    async fn call_rejects_oversized_body() {
        let (state, _path) = state_with_settings("", "curl");
        let resp = app(state)
            .oneshot(json_request("/api/call", vec![b' '; MAX_BODY_BYTES + 1]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn call_fills_path_params_from_settings() {
        let (state, _path) = state_with_settings(
            "API_KEY=secret123\nTEAM_ID=t1\n",
            "/nonexistent/dir/curl",
        );
        let body = r#"{"urlTemplate":"https://api.example.com/teams/:teamId/bots/:botId","pathParams":{"botId":"b1"}}"#;
        let resp = app(state).oneshot(json_request("/api/call", body)).await.unwrap();

        // the binary is missing, so the call fails after the request was built
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(
            json["request"]["finalUrl"],
            "https://api.example.com/teams/t1/bots/b1"
        );
        let command = json["request"]["displayCommand"].as_str().unwrap();
        assert!(command.contains("Authorization: Bearer ***"));
        assert!(!command.contains("secret123"));
        assert!(json["error"].as_str().unwrap().contains("was not found"));
    }

    #[tokio::test]
    async fn call_reports_missing_path_params() {
        let (state, _path) = state_with_settings("", "curl");
        let body = r#"{"urlTemplate":"https://h/:a/:b"}"#;
        let resp = app(state).oneshot(json_request("/api/call", body)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error"],
            "Missing required path parameters: a, b"
        );
    }

    #[tokio::test]
    async fn config_reports_defaults_without_token() {
        let (state, _path) =
            state_with_settings("API_KEY=secret123\nTEAM_ID=t1\nBOT_ID=b1\n", "curl");
        let resp = app(state)
            .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["config"]["hasDefaults"], true);
        assert_eq!(json["config"]["hasBearerToken"], true);
        assert_eq!(json["config"]["teamId"], "t1");
        assert_eq!(json["config"]["botId"], "b1");
        assert!(!json.to_string().contains("secret123"));
    }

    #[tokio::test]
    async fn wrong_method_is_json_404() {
        let (state, _path) = state_with_settings("", "curl");
        let router = app(state);

        let resp = router
            .clone()
            .oneshot(Request::builder().uri("/api/call").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Not found.");

        let resp = router
            .oneshot(json_request("/api/config", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Not found.");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (state, _path) = state_with_settings("", "curl");
        let resp = app(state)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Not found.");
    }
}
