//! Route table.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/stats", get(api::health::stats))
        .route("/rules", get(api::rules::list).post(api::rules::create))
        .route(
            "/rules/{id}",
            get(api::rules::get_one)
                .put(api::rules::update)
                .delete(api::rules::remove),
        )
        .route("/alerts", get(api::alerts::list).post(api::alerts::create))
        .route("/alerts/{id}", get(api::alerts::get_one).delete(api::alerts::archive))
        .route("/alerts/{id}/acknowledge", post(api::alerts::acknowledge))
        .route("/alerts/{id}/resolve", post(api::alerts::resolve))
        .route("/alerts/{id}/escalate", post(api::alerts::escalate))
        .route("/notifications", get(api::notifications::list))
        .route("/notifications/{id}", get(api::notifications::get_one))
        .route(
            "/notifications/{id}/delivered",
            post(api::notifications::delivered),
        )
        .route(
            "/escalation-policies",
            get(api::policies::list).post(api::policies::create),
        )
        .route(
            "/escalation-policies/{id}",
            get(api::policies::get_one)
                .put(api::policies::update)
                .delete(api::policies::remove),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
