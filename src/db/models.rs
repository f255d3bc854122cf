use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{LockState, QuestionPart, Subject, SubmissionState};
use crate::schemas::answers::{AnswerKey, AnswerKeySet, CandidateAnswers};
use crate::schemas::paper::SourceDocument;
use crate::services::scoring::ScoreReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamPaper {
    pub(crate) id: String,
    pub(crate) contest_id: String,
    pub(crate) code: String,
    pub(crate) subject: Subject,
    pub(crate) part1_count: i32,
    pub(crate) part2_count: i32,
    pub(crate) part3_count: i32,
    pub(crate) answer_key: Json<AnswerKeySet>,
    pub(crate) source_document: Option<Json<SourceDocument>>,
    pub(crate) revision: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamQuestion {
    pub(crate) id: String,
    pub(crate) paper_id: String,
    pub(crate) part: QuestionPart,
    pub(crate) number: i32,
    pub(crate) answer: Json<AnswerKey>,
    pub(crate) max_points_centi: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamSession {
    pub(crate) id: String,
    pub(crate) contest_id: String,
    pub(crate) candidate_id: String,
    pub(crate) paper_code: String,
    pub(crate) violation_count: i32,
    pub(crate) lock_state: LockState,
    pub(crate) submission_state: SubmissionState,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct AnswerSheet {
    pub(crate) session_id: String,
    pub(crate) answers: Json<CandidateAnswers>,
    pub(crate) saved_at: Option<PrimitiveDateTime>,
    pub(crate) finalized: bool,
    pub(crate) final_report: Option<Json<ScoreReport>>,
    pub(crate) updated_at: PrimitiveDateTime,
}
