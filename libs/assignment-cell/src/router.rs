use std::sync::Arc;

use axum::{
    Router,
    routing::post,
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn assignment_routes(state: Arc<AppConfig>) -> Router {
    // Every assignment route is protected
    Router::new()
        .route("/", post(handlers::request_assignment))
        .route("/evaluate", post(handlers::evaluate_assignment))
        .route("/commit", post(handlers::commit_assignment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
