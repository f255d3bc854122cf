use serde::{Deserialize, Serialize};
use validator::Validate;

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{ExamPaper, ExamQuestion};
use crate::db::types::Subject;
use crate::schemas::answers::{AnswerKey, AnswerKeySet, PartCounts};
use crate::services::scoring::Points;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DocumentKind {
    Docx,
    Pdf,
    Text,
}

/// Fingerprint of the upload a paper's keys were last synced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SourceDocument {
    pub(crate) filename: String,
    pub(crate) kind: DocumentKind,
    pub(crate) sha256: String,
    pub(crate) size_bytes: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub(crate) struct PartCountsInput {
    #[validate(range(max = 200, message = "part1 must be at most 200"))]
    pub(crate) part1: u32,
    #[validate(range(max = 50, message = "part2 must be at most 50"))]
    pub(crate) part2: u32,
    #[validate(range(max = 50, message = "part3 must be at most 50"))]
    pub(crate) part3: u32,
}

impl From<PartCountsInput> for PartCounts {
    fn from(value: PartCountsInput) -> Self {
        Self { part1: value.part1, part2: value.part2, part3: value.part3 }
    }
}

/// Per-part text typed into separate fields; omitted parts keep their current keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ManualAnswers {
    #[serde(default)]
    pub(crate) part1: Option<String>,
    #[serde(default)]
    pub(crate) part2: Option<String>,
    #[serde(default)]
    pub(crate) part3: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PaperSyncRequest {
    pub(crate) subject: Subject,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) counts: Option<PartCountsInput>,
    /// A whole answer document with `[PART1]`..`[PART3]` markers.
    #[serde(default)]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) manual: Option<ManualAnswers>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperResponse {
    pub(crate) id: String,
    pub(crate) contest_id: String,
    pub(crate) code: String,
    pub(crate) subject: Subject,
    pub(crate) counts: PartCounts,
    pub(crate) answer_key: AnswerKeySet,
    pub(crate) source_document: Option<SourceDocument>,
    pub(crate) revision: i32,
    pub(crate) max_raw_points: f64,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaperSummary {
    pub(crate) code: String,
    pub(crate) subject: Subject,
    pub(crate) counts: PartCounts,
    pub(crate) revision: i32,
    pub(crate) updated_at: String,
}

/// One generated question record; `answer` carries its part.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) number: i32,
    pub(crate) answer: AnswerKey,
    pub(crate) max_points: f64,
}

impl From<ExamQuestion> for QuestionResponse {
    fn from(question: ExamQuestion) -> Self {
        Self {
            number: question.number,
            answer: question.answer.0,
            max_points: Points::from_centi(i64::from(question.max_points_centi)).as_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RescoreResponse {
    pub(crate) contest_id: String,
    pub(crate) rescored: usize,
    /// In-progress sheets, which are always scored live.
    pub(crate) live: usize,
    pub(crate) skipped_finalized: usize,
}

pub(crate) fn paper_counts(paper: &ExamPaper) -> PartCounts {
    PartCounts {
        part1: paper.part1_count.max(0) as u32,
        part2: paper.part2_count.max(0) as u32,
        part3: paper.part3_count.max(0) as u32,
    }
}

impl From<&ExamPaper> for PaperSummary {
    fn from(paper: &ExamPaper) -> Self {
        Self {
            code: paper.code.clone(),
            subject: paper.subject,
            counts: paper_counts(paper),
            revision: paper.revision,
            updated_at: format_primitive(paper.updated_at),
        }
    }
}
