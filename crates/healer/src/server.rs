//! HTTP status API.
//!
//! Provides REST API endpoints for:
//! - Liveness
//! - Latest health report per stack
//! - On-demand checks of one stack
//! - Recent history

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::InvalidStackKey;
use crate::scheduler::Scheduler;
use crate::types::StackKey;

/// Default number of history entries returned by `/api/history`.
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// State shared across handlers.
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
    /// Bearer token required on `/api/*` when set.
    pub token: Option<String>,
}

impl ApiState {
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler>, token: Option<String>) -> Self {
        Self { scheduler, token }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ApiState>) -> Router {
    let api = Router::new()
        .route("/stacks", get(list_stacks_handler))
        .route("/stacks/{key}", get(stack_handler))
        .route("/stacks/{key}/check", post(check_handler))
        .route("/history", get(history_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `cancel` fires.
///
/// # Errors
///
/// Returns an error if the server fails to bind or stops unexpectedly.
pub async fn run_server(
    state: Arc<ApiState>,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status API listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Status API stopped");
    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_key(e: &InvalidStackKey) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_stacks_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.scheduler.latest_reports().await)
}

async fn stack_handler(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> Response {
    let key = match StackKey::parse(&key) {
        Ok(key) => key,
        Err(e) => return bad_key(&e),
    };
    match state.scheduler.latest_report(&key).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown stack: {key}"),
            }),
        )
            .into_response(),
    }
}

async fn check_handler(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> Response {
    let key = match StackKey::parse(&key) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "Rejected on-demand check");
            return bad_key(&e);
        }
    };
    info!(stack = %key, "On-demand check requested");
    Json(state.scheduler.check_stack(&key).await).into_response()
}

async fn history_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(state.scheduler.recent_history(limit).await)
}

async fn require_token(State(state): State<Arc<ApiState>>, request: Request, next: Next) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let authorized =
        presented.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())));
    if authorized {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "Rejected unauthenticated API request");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "missing or invalid bearer token".to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertDispatcher;
    use crate::config::MonitorConfig;
    use crate::history::HistoryStore;
    use crate::probe::tests::{exited, running, FakeController};
    use crate::resources::NoResourceSampler;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    async fn app(token: Option<&str>) -> Router {
        let fake = Arc::new(
            FakeController::default()
                .with_stack("alpha", vec![running("a1")])
                .with_stack("beta", vec![exited("b1")]),
        );
        app_with(fake, token, false).await
    }

    async fn app_with(
        fake: Arc<FakeController>,
        token: Option<&str>,
        auto_restart: bool,
    ) -> Router {
        let mut config = MonitorConfig::with_data_root("/unused");
        config.auto_restart = auto_restart;
        let scheduler = Arc::new(Scheduler::new(
            config,
            fake,
            Arc::new(NoResourceSampler),
            HistoryStore::in_memory(10),
            AlertDispatcher::from_config(&MonitorConfig::with_data_root("/unused")),
        ));
        scheduler.run_cycle(&CancellationToken::new()).await;
        build_router(Arc::new(ApiState::new(
            scheduler,
            token.map(ToString::to_string),
        )))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(None).await.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_stacks_sorted() {
        let response = app(None).await.oneshot(get_req("/api/stacks")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let stacks = body.as_array().unwrap();
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0]["stack_key"], "alpha");
        assert_eq!(stacks[0]["status"], "healthy");
        assert_eq!(stacks[1]["stack_key"], "beta");
        assert_eq!(stacks[1]["status"], "unhealthy");
        assert_eq!(stacks[1]["issues"][0], "b1 is exited");
    }

    #[tokio::test]
    async fn test_unknown_stack_is_404() {
        let response = app(None)
            .await
            .oneshot(get_req("/api/stacks/ghost"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_on_demand_check() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/stacks/ghost/check")
            .body(Body::empty())
            .unwrap();
        let response = app(None).await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "no_containers");
    }

    #[tokio::test]
    async fn test_history_limit() {
        let response = app(None)
            .await
            .oneshot(get_req("/api/history?limit=5"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let app = app(Some("s3cret")).await;

        let denied = app.clone().oneshot(get_req("/api/stacks")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = HttpRequest::builder()
            .uri("/api/stacks")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(allowed).await.unwrap().status(), StatusCode::OK);

        for bad in ["Bearer s3cre", "Bearer s3cret0", "s3cret", "Bearer "] {
            let wrong = HttpRequest::builder()
                .uri("/api/stacks")
                .header(header::AUTHORIZATION, bad)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(wrong).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{bad}");
        }

        let health = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_traversal_key_is_rejected() {
        // A stack with this name would be restarted if the key reached the controller.
        let fake = Arc::new(
            FakeController::default()
                .with_stack("alpha", vec![running("a1")])
                .with_stack("../outside", vec![exited("o1")]),
        );
        let app = app_with(fake.clone(), None, true).await;
        let restarts_after_cycle = fake.restart_count();

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/stacks/..%2Foutside/check")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("../outside"));
        assert_eq!(fake.restart_count(), restarts_after_cycle);

        let response = app
            .oneshot(get_req("/api/stacks/..%2Foutside"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
