use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentRequest, AssignmentOutcome, AssignmentSnapshot, EngineConfig};
use crate::services::{AssignmentOptimizer, DoctorAssignmentService};

#[derive(Debug, Deserialize)]
pub struct CommitAssignmentRequest {
    pub request: AppointmentRequest,
    pub doctor_id: Uuid,
}

/// Runs the engine over a caller-supplied snapshot. No collaborator is consulted.
#[axum::debug_handler]
pub async fn evaluate_assignment(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Json(snapshot): Json<AssignmentSnapshot>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    info!("User {} evaluating assignment for patient {}", user.id, snapshot.request.patient_ref);

    let optimizer = AssignmentOptimizer::new(EngineConfig::from_app_config(&state));
    let outcome = optimizer.assign(&snapshot)?;

    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn request_assignment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AppointmentRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let token = auth.token();
    info!("User {} requesting assignment for patient {}", user.id, request.patient_ref);

    let service = DoctorAssignmentService::new(&state);
    let outcome = service.assign_doctor(request, token).await?;

    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn commit_assignment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(body): Json<CommitAssignmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let service = DoctorAssignmentService::new(&state);
    let committed = service
        .commit_assignment(&body.request, body.doctor_id, token)
        .await?;

    Ok(Json(json!({
        "doctor_id": body.doctor_id,
        "committed": committed
    })))
}
