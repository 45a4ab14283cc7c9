use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use frame_enhance_pipeline::shared::{ConfigUpdate, ConfigView, SharedConfig};
use frame_enhance_pipeline::sink::{multipart, StreamHub};
use futures_util::StreamExt;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod page;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedConfig>,
    pub hub: Arc<StreamHub>,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct UpdateResponse {
    status: &'static str,
    config: ConfigView,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    viewers: usize,
}

fn bad_request(error: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            status: "error",
            error,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /config
async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(state.shared.current().view())
}

/// POST /config. Absent fields keep their current value; a rejected request
/// changes nothing.
async fn post_config(
    State(state): State<AppState>,
    body: Result<Json<ConfigUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "malformed config request");
            return bad_request(rejection.body_text());
        }
    };
    match state.shared.apply(&update) {
        Ok(outcome) => {
            let config = outcome.config.view();
            info!(
                clahe = config.clahe,
                denoise = config.denoise,
                unsharp_amount = config.unsharp_amount,
                source = %config.source,
                source_changed = outcome.source_changed,
                "config updated"
            );
            Json(UpdateResponse {
                status: "updated",
                config,
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "config update rejected");
            bad_request(e.to_string())
        }
    }
}

/// GET /video_feed: MJPEG until the client goes away or the hub closes.
async fn video_feed(State(state): State<AppState>) -> Response {
    let viewer = state.hub.subscribe();
    let stream = viewer.map(Ok::<_, Infallible>);
    (
        [
            (header::CONTENT_TYPE, multipart::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        viewers: state.hub.viewer_count(),
    })
}

/// GET /
async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/config", get(get_config).post(post_config))
        .route("/video_feed", get(video_feed))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
