use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::db::models::ExamPaper;
use crate::db::types::Subject;
use crate::schemas::answers::PartCounts;
use crate::schemas::paper::{
    format_primitive, paper_counts, PaperResponse, PaperSummary, PaperSyncRequest,
    PartCountsInput, QuestionResponse,
};
use crate::services::answer_text::render_answer_document;
use crate::services::paper_sync::{self, SyncRequest, SyncSource};
use crate::services::scoring::max_raw_points;

/// Room for the multipart envelope and the small text fields around the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/contests/:contest_id/papers", get(list_papers))
        .route("/contests/:contest_id/papers/:code", get(get_paper).put(sync_paper))
        .route(
            "/contests/:contest_id/papers/:code/document",
            post(upload_document)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/contests/:contest_id/papers/:code/export", get(export_paper))
        .route("/contests/:contest_id/papers/:code/questions", get(list_questions))
}

async fn list_papers(
    Path(contest_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PaperSummary>>, ApiError> {
    let papers = state.papers().list_papers(&contest_id).await?;
    Ok(Json(papers.iter().map(PaperSummary::from).collect()))
}

async fn get_paper(
    Path((contest_id, code)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<PaperResponse>, ApiError> {
    let paper = fetch_paper(&state, &contest_id, &code).await?;
    Ok(Json(paper_to_response(paper)))
}

async fn sync_paper(
    Path((contest_id, code)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(payload): Json<PaperSyncRequest>,
) -> Result<Json<PaperResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let source = match (payload.text, payload.manual) {
        (Some(text), None) => SyncSource::Text(text),
        (None, Some(manual)) => SyncSource::Manual(manual),
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "Provide either text or manual answers, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(ApiError::BadRequest("text or manual answers are required".to_string()));
        }
    };

    let request = SyncRequest {
        contest_id,
        code,
        subject: payload.subject,
        counts: payload.counts.map(PartCounts::from),
        source,
    };
    let paper = paper_sync::sync_paper(state.papers(), request).await?;
    Ok(Json(paper_to_response(paper)))
}

async fn upload_document(
    Path((contest_id, code)): Path<(String, String)>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PaperResponse>, ApiError> {
    let max_mb = state.settings().exam().max_upload_size_mb;
    let max_bytes = (max_mb * 1024 * 1024) as usize;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut subject: Option<Subject> = None;
    let mut declared: [Option<u32>; 3] = [None; 3];

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File size exceeds {max_mb}MB limit"
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                file_bytes = Some(bytes);
            }
            "subject" => {
                let text = read_text_field(field, "subject").await?;
                subject = Some(
                    serde_json::from_value(serde_json::Value::String(text.trim().to_string()))
                        .map_err(|_| ApiError::BadRequest(format!("Unknown subject {text:?}")))?,
                );
            }
            "part1_count" | "part2_count" | "part3_count" => {
                let text = read_text_field(field, &name).await?;
                let value = text.trim().parse::<u32>().map_err(|_| {
                    ApiError::BadRequest(format!("{name} must be a non-negative integer"))
                })?;
                let slot = match name.as_str() {
                    "part1_count" => 0,
                    "part2_count" => 1,
                    _ => 2,
                };
                declared[slot] = Some(value);
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    let filename =
        filename.ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;
    let subject = subject.ok_or_else(|| ApiError::BadRequest("subject is required".to_string()))?;
    let counts = upload_counts(declared)?;

    let document = paper_sync::extract_upload(filename, file_bytes, max_bytes).await?;
    let request = SyncRequest {
        contest_id,
        code,
        subject,
        counts,
        source: SyncSource::Document(document),
    };
    let paper = paper_sync::sync_paper(state.papers(), request).await?;
    Ok(Json(paper_to_response(paper)))
}

/// Counts arrive as separate form fields; all three or none.
fn upload_counts(declared: [Option<u32>; 3]) -> Result<Option<PartCounts>, ApiError> {
    match declared {
        [None, None, None] => Ok(None),
        [Some(part1), Some(part2), Some(part3)] => {
            let input = PartCountsInput { part1, part2, part3 };
            input.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
            Ok(Some(input.into()))
        }
        _ => Err(ApiError::BadRequest(
            "part1_count, part2_count and part3_count must be sent together".to_string(),
        )),
    }
}

async fn export_paper(
    Path((contest_id, code)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let paper = fetch_paper(&state, &contest_id, &code).await?;
    let body = render_answer_document(&paper.answer_key.0);
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}

async fn list_questions(
    Path((contest_id, code)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let paper = fetch_paper(&state, &contest_id, &code).await?;
    let questions = state.papers().list_questions(&paper.id).await?;
    Ok(Json(questions.into_iter().map(QuestionResponse::from).collect()))
}

async fn read_text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<String, ApiError> {
    field.text().await.map_err(|_| ApiError::BadRequest(format!("Invalid {name} field")))
}

async fn fetch_paper(state: &AppState, contest_id: &str, code: &str) -> Result<ExamPaper, ApiError> {
    state.papers().find_paper(contest_id, code).await?.ok_or_else(|| {
        ApiError::NotFound(format!("Paper {code} not found in contest {contest_id}"))
    })
}

fn paper_to_response(paper: ExamPaper) -> PaperResponse {
    let counts = paper_counts(&paper);
    PaperResponse {
        max_raw_points: max_raw_points(&counts, paper.subject).as_f64(),
        id: paper.id,
        contest_id: paper.contest_id,
        code: paper.code,
        subject: paper.subject,
        counts,
        answer_key: paper.answer_key.0,
        source_document: paper.source_document.map(|source| source.0),
        revision: paper.revision,
        created_at: format_primitive(paper.created_at),
        updated_at: format_primitive(paper.updated_at),
    }
}
