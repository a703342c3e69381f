use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};

use crate::auth::{self, JwksVerifier, TokenVerifierRef};
use crate::config::RelayConfig;
use crate::dispatch::Relay;
use crate::request::ConsultationRequest;
use crate::transport::{WireEncoding, frame_events};

const NO_STATIC_MESSAGE: &str = "No static files found. Run 'npm run build' first.";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub verifier: Option<TokenVerifierRef>,
    pub development: bool,
    pub encoding: WireEncoding,
}

impl AppState {
    pub fn from_config(config: &RelayConfig) -> Self {
        let verifier = config
            .jwks_url
            .as_ref()
            .map(|url| Arc::new(JwksVerifier::new(url.clone())) as TokenVerifierRef);
        Self {
            relay: Arc::new(Relay::from_config(config)),
            verifier,
            development: config.is_development(),
            encoding: config.wire_encoding,
        }
    }
}

pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let api = Router::new()
        .route("/api/consultation", post(handle_consultation))
        .route("/api", post(handle_consultation))
        .route("/api/models", get(handle_models))
        .route("/health", get(handle_health));

    let app = if static_dir.is_dir() {
        let index = ServeFile::new(static_dir.join("index.html"));
        api.fallback_service(ServeDir::new(static_dir).fallback(index))
    } else {
        api.route("/", get(handle_missing_static))
    };

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn handle_consultation(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started_at = Instant::now();
    let request_id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let span = info_span!("consultation", request_id);
    async move {
        if let Err(error) =
            auth::authorize(&headers, state.verifier.as_deref(), state.development).await
        {
            warn!("rejected consultation: {error}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "detail": format!("Invalid or missing authentication token: {error}"),
                })),
            )
                .into_response();
        }

        let request: ConsultationRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(error) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "detail": format!("invalid request body: {error}") })),
                )
                    .into_response();
            }
        };

        let model_id = state.relay.resolve_model(&request).to_string();
        let display_name = state.relay.display_name(&model_id);
        info!(model = %model_id, topic = %request.topic, "consultation accepted");

        let events = state.relay.dispatch(request);
        let frames = frame_events(events, started_at, display_name, state.encoding);
        sse_response(Body::from_stream(frames))
    }
    .instrument(span)
    .await
}

fn sse_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

async fn handle_models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "models": state.relay.catalog().to_json() }))
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn handle_missing_static() -> Json<Value> {
    Json(json!({ "message": NO_STATIC_MESSAGE }))
}

/// Binds the listener and serves until Ctrl-C or SIGTERM.
pub async fn serve(config: RelayConfig) -> Result<(), String> {
    let state = AppState::from_config(&config);
    if state.verifier.is_none() && !state.development {
        warn!("no JWKS url configured; every consultation will be rejected");
    }
    let app = build_router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| format!("bind listener on {} failed: {error}", config.bind_addr))?;
    info!(
        bind = %config.bind_addr,
        environment = %config.environment,
        default_model = %config.default_model,
        "meetingmind gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = crate::wait_for_shutdown_signal().await {
                warn!("shutdown signal handler failed: {error}");
            }
        })
        .await
        .map_err(|error| format!("server stopped: {error}"))?;
    info!("meetingmind gateway stopped");
    Ok(())
}
