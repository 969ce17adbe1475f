use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::EngineError,
    models::{CreateAttemptRequest, CreateRetryAttemptRequest, GradeAnswerRequest},
    services::{
        attempt_service::AttemptService, grading_service::GradingService,
        retry_service::RetryService, AppState,
    },
};

pub async fn create_attempt(
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
    Json(req): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Creating attempt for student_id={}, unit_id={}, session_id={}",
        req.student_id,
        unit_id,
        req.session_id
    );

    let service = AttemptService::new(&state);
    let page = service.create_attempt(&unit_id, req).await?;

    Ok((StatusCode::OK, Json(page)))
}

pub async fn create_retry_attempt(
    State(state): State<Arc<AppState>>,
    Path(unit_id): Path<String>,
    Json(req): Json<CreateRetryAttemptRequest>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Creating retry attempt for student_id={}, unit_id={}, prior_attempt_id={}",
        req.student_id,
        unit_id,
        req.prior_attempt_id
    );

    let service = RetryService::new(&state);
    let response = service.create_retry_attempt(&unit_id, req).await?;

    Ok((StatusCode::OK, Json(response)))
}

pub async fn grade_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Json(req): Json<GradeAnswerRequest>,
) -> Result<impl IntoResponse, EngineError> {
    tracing::info!(
        "Grading answer for attempt_id={}, question_id={}",
        attempt_id,
        req.question_id
    );

    let service = GradingService::new(&state);
    let response = service.grade_answer(&attempt_id, req).await?;

    Ok((StatusCode::OK, Json(response)))
}

pub async fn get_completeness(
    State(state): State<Arc<AppState>>,
    Path((unit_id, student_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, EngineError> {
    let completeness = state
        .completeness
        .get_completeness(&unit_id, &student_id)
        .await
        .map_err(EngineError::store("completeness store"))?
        .ok_or_else(|| {
            EngineError::NotFound(format!(
                "completeness of unit {} for student {}",
                unit_id, student_id
            ))
        })?;

    Ok((StatusCode::OK, Json(completeness)))
}
