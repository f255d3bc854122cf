use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::answer_parser::ParseError;
use crate::services::document_text::DocumentExtractionError;
use crate::services::exam_session::SessionError;
use crate::services::paper_sync::SyncError;
use crate::services::stores::StoreError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err, "Storage operation failed")
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Grammar(_) => ApiError::internal(err, "Answer grammar failed to load"),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<DocumentExtractionError> for ApiError {
    fn from(err: DocumentExtractionError) -> Self {
        match err {
            DocumentExtractionError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            DocumentExtractionError::Interrupted(_) => {
                ApiError::internal(err, "Document extraction was interrupted")
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Parse(err) => err.into(),
            SyncError::DocumentExtraction(err) => err.into(),
            SyncError::IncompleteAnswerSet { .. } | SyncError::InvalidPaper(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SyncError::Integrity(_) => ApiError::internal(err, "Exam paper failed integrity check"),
            SyncError::Database(err) => err.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionLocked { .. }
            | SessionError::SessionFinalized
            | SessionError::SessionNotStarted
            | SessionError::SessionNotSubmitted
            | SessionError::PaperChanged => ApiError::Conflict(err.to_string()),
            SessionError::SessionNotFound(_)
            | SessionError::NoPaperConfigured(_)
            | SessionError::UnknownPaper { .. } => ApiError::NotFound(err.to_string()),
            SessionError::InvalidAnswers(_) => ApiError::BadRequest(err.to_string()),
            SessionError::Store(err) => err.into(),
        }
    }
}
