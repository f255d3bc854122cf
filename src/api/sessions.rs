use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::schemas::paper::RescoreResponse;
use crate::schemas::session::{
    AdminOverrideRequest, EnterResponse, ResultResponse, SaveAnswersRequest, SessionResponse,
    ViolationResponse,
};
use crate::services::exam_session::SessionError;
use crate::services::sessions::SessionService;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/contests/:contest_id/candidates/:candidate_id/enter", post(enter))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/answers", put(save_answers))
        .route("/sessions/:session_id/violations", post(record_violation))
        .route("/sessions/:session_id/submit", post(submit))
        .route("/sessions/:session_id/result", get(result))
}

pub(crate) fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/sessions/:session_id/override", post(admin_override))
        .route("/contests/:contest_id/rescore", post(rescore))
}

pub(crate) fn service(state: &AppState) -> SessionService<'_> {
    SessionService::new(state.papers(), state.sessions(), state.settings().exam())
}

async fn enter(
    Path((contest_id, candidate_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<EnterResponse>), ApiError> {
    let outcome = service(&state).enter(&contest_id, &candidate_id).await?;
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(EnterResponse { created: outcome.created, session: outcome.record.into() }),
    ))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let record = service(&state).get(&session_id).await?;
    Ok(Json(record.into()))
}

async fn save_answers(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = service(&state).save_answers(&session_id, payload.answers).await?;
    Ok(Json(record.into()))
}

async fn record_violation(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ViolationResponse>, ApiError> {
    let (_, outcome) = service(&state).record_violation(&session_id).await?;
    let threshold = state.settings().exam().violation_threshold;
    Ok(Json(ViolationResponse::new(outcome, threshold)))
}

async fn submit(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let record = service(&state).submit(&session_id).await?;
    Ok(Json(record.into()))
}

async fn result(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ResultResponse>, ApiError> {
    let record = service(&state).get(&session_id).await?;
    let report = record
        .sheet
        .final_report
        .clone()
        .ok_or(SessionError::SessionNotSubmitted)?;

    Ok(Json(ResultResponse {
        session_id: record.session.id,
        candidate_id: record.session.candidate_id,
        submission_state: record.session.submission_state,
        finalized_at: record.session.finalized_at.map(format_primitive),
        report: report.0,
    }))
}

async fn admin_override(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<AdminOverrideRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = service(&state).admin_override(&session_id, payload.into()).await?;
    Ok(Json(record.into()))
}

async fn rescore(
    Path(contest_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RescoreResponse>, ApiError> {
    let summary = service(&state).rescore(&contest_id).await?;
    Ok(Json(RescoreResponse {
        contest_id,
        rescored: summary.rescored,
        live: summary.live,
        skipped_finalized: summary.skipped_finalized,
    }))
}
