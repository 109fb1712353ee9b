use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, missing_link_id, resolve_shortlink, track, RedirectState};

pub fn create_redirect_router(state: Arc<RedirectState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/l", get(missing_link_id))
        .route("/l/", get(missing_link_id))
        .route("/l/{link_id}", get(resolve_shortlink))
        .route("/track", get(track))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
