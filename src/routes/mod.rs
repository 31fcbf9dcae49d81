//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - `GET /generate-stories` generation trigger (plain-text status line)
/// - `GET /:language/:level` today's story (case-insensitive)
/// - JSON API under `/api/v1/...` (health, archive by date, stored dates)
/// - Static assets under `/static`, index fallback for anything else
/// - CORS (allow any origin/method/headers) and HTTP trace spans
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate-stories", get(http::http_generate_stories))
        .route("/:language/:level", get(http::http_get_today_story))
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/stories", get(http::http_list_dates))
        .route("/api/v1/stories/:date/:language/:level", get(http::http_get_story_for_date))
        .nest_service("/static", ServeDir::new("./static"))
        .fallback_service(ServeFile::new("./static/index.html"))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
