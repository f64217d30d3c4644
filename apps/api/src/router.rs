use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use assignment_cell::router::assignment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic assignment API is running!" }))
        .nest("/assignments", assignment_routes(state))
}
