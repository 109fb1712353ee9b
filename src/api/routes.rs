use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{require_api_key, ApiKeyGuard};

use super::handlers::{health_check, lookup_entity, ranked_products, submit_review, AppState};
use super::ledger::{award_points, list_user_ledger, verify_ledger_hashes};
use super::shortlinks::{create_shortlink, get_shortlink, list_shortlink_clicks};

pub fn create_api_router(state: Arc<AppState>, guard: Arc<ApiKeyGuard>) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/ledger/users/{user_id}", get(list_user_ledger))
        .route("/api/admin/ledger/verify", get(verify_ledger_hashes))
        .route("/api/admin/ledger/awards", post(award_points))
        .route("/api/admin/shortlinks", post(create_shortlink))
        .route("/api/admin/shortlinks/{id}", get(get_shortlink))
        .route("/api/admin/shortlinks/{id}/clicks", get(list_shortlink_clicks))
        .route_layer(middleware::from_fn_with_state(guard, require_api_key))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/reviews", post(submit_review))
        .route("/api/products/ranked", get(ranked_products))
        .route("/api/lookup/{entity_type}", get(lookup_entity))
        .with_state(state)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
