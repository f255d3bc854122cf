//! The only writer of exam papers. A sync either commits a fully validated key set with
//! freshly generated questions or leaves the stored paper untouched.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::metrics::PAPER_SYNC_TOTAL;
use crate::db::models::ExamPaper;
use crate::db::types::{QuestionPart, Subject};
use crate::schemas::answers::{AnswerKeySet, PartCounts};
use crate::schemas::paper::{paper_counts, ManualAnswers};
use crate::services::answer_parser::{
    parse_answer_document, parse_part_lines, ParseError, ParsedAnswers,
};
use crate::services::document_text::{extract_document, DocumentExtractionError, ExtractedDocument};
use crate::services::stores::{PaperDraft, PaperStore, StoreError};

const MAX_CODE_LEN: usize = 32;

#[derive(Debug, Error)]
pub(crate) enum SyncError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{part} answers do not cover 1..={expected}: missing {missing:?}, unexpected {extra:?}")]
    IncompleteAnswerSet { part: QuestionPart, expected: u32, missing: Vec<u32>, extra: Vec<u32> },
    #[error(transparent)]
    DocumentExtraction(#[from] DocumentExtractionError),
    #[error("invalid paper: {0}")]
    InvalidPaper(String),
    #[error("paper integrity check failed: {0}")]
    Integrity(String),
    #[error(transparent)]
    Database(#[from] StoreError),
}

impl SyncError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Integrity(_) | Self::Database(_) => "error",
            _ => "rejected",
        }
    }
}

/// Where the new keys come from.
#[derive(Debug, Clone)]
pub(crate) enum SyncSource {
    /// Sectioned answer text typed or pasted by the administrator.
    Text(String),
    /// Text extracted from an uploaded answer document.
    Document(ExtractedDocument),
    /// Per-part fields; omitted parts keep the current keys.
    Manual(ManualAnswers),
}

#[derive(Debug, Clone)]
pub(crate) struct SyncRequest {
    pub(crate) contest_id: String,
    pub(crate) code: String,
    pub(crate) subject: Subject,
    /// Falls back to the stored paper's counts, then to the THPTQG defaults.
    pub(crate) counts: Option<PartCounts>,
    pub(crate) source: SyncSource,
}

pub(crate) async fn sync_paper(
    papers: &dyn PaperStore,
    request: SyncRequest,
) -> Result<ExamPaper, SyncError> {
    let contest_id = request.contest_id.clone();
    let code = request.code.clone();

    let result = apply_sync(papers, request).await;
    match &result {
        Ok(paper) => {
            metrics::counter!(PAPER_SYNC_TOTAL, "outcome" => "ok").increment(1);
            tracing::info!(
                contest_id = %paper.contest_id,
                paper_code = %paper.code,
                subject = paper.subject.as_str(),
                revision = paper.revision,
                part1 = paper.part1_count,
                part2 = paper.part2_count,
                part3 = paper.part3_count,
                "Exam paper synced"
            );
        }
        Err(err) => {
            metrics::counter!(PAPER_SYNC_TOTAL, "outcome" => err.outcome()).increment(1);
            tracing::info!(
                contest_id = %contest_id,
                paper_code = %code,
                error = %err,
                "Exam paper sync rejected"
            );
        }
    }
    result
}

/// Runs the blocking extractor off the async runtime.
pub(crate) async fn extract_upload(
    filename: String,
    bytes: Vec<u8>,
    max_bytes: usize,
) -> Result<ExtractedDocument, SyncError> {
    let extracted =
        tokio::task::spawn_blocking(move || extract_document(&filename, &bytes, max_bytes))
            .await
            .map_err(|err| DocumentExtractionError::Interrupted(err.to_string()))??;
    Ok(extracted)
}

async fn apply_sync(papers: &dyn PaperStore, request: SyncRequest) -> Result<ExamPaper, SyncError> {
    validate_identity(&request.contest_id, &request.code)?;

    let existing = papers.find_paper(&request.contest_id, &request.code).await?;
    let current_counts = existing.as_ref().map(paper_counts);
    let declared = request.counts.or(current_counts).unwrap_or_default();

    let (keys, source_document) = match request.source {
        SyncSource::Text(text) => {
            let parsed = parse_answer_document(&text, &declared)?;
            (keys_from_parsed(&parsed, &declared)?, None)
        }
        SyncSource::Document(document) => {
            let parsed = parse_answer_document(&document.text, &declared)?;
            (keys_from_parsed(&parsed, &declared)?, Some(document.source))
        }
        SyncSource::Manual(manual) => {
            (merge_manual(&manual, &declared, existing.as_ref())?, None)
        }
    };

    let draft = PaperDraft {
        contest_id: request.contest_id,
        code: request.code,
        subject: request.subject,
        counts: keys.counts(),
        keys,
        source_document,
    };
    let paper = papers.replace_paper(draft).await.map_err(|err| match err {
        StoreError::Inconsistent(detail) => SyncError::Integrity(detail),
        other => SyncError::Database(other),
    })?;

    Ok(paper)
}

fn validate_identity(contest_id: &str, code: &str) -> Result<(), SyncError> {
    if contest_id.trim().is_empty() {
        return Err(SyncError::InvalidPaper("contest id must not be empty".to_string()));
    }
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(SyncError::InvalidPaper(format!(
            "paper code must be 1 to {MAX_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(SyncError::InvalidPaper(format!(
            "paper code {code:?} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

/// Indices of each part must be exactly `1..=count`.
pub(crate) fn check_coverage(
    part: QuestionPart,
    numbers: &[u32],
    expected: u32,
) -> Result<(), SyncError> {
    let missing: Vec<u32> = (1..=expected).filter(|number| !numbers.contains(number)).collect();
    let extra: Vec<u32> =
        numbers.iter().copied().filter(|number| *number == 0 || *number > expected).collect();

    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    Err(SyncError::IncompleteAnswerSet { part, expected, missing, extra })
}

fn ordered<T: Clone>(
    part: QuestionPart,
    answers: &BTreeMap<u32, T>,
    expected: u32,
) -> Result<Vec<T>, SyncError> {
    let numbers: Vec<u32> = answers.keys().copied().collect();
    check_coverage(part, &numbers, expected)?;
    Ok(answers.values().cloned().collect())
}

pub(crate) fn keys_from_parsed(
    parsed: &ParsedAnswers,
    counts: &PartCounts,
) -> Result<AnswerKeySet, SyncError> {
    Ok(AnswerKeySet {
        part1: ordered(QuestionPart::Part1, &parsed.part1, counts.part1)?,
        part2: ordered(QuestionPart::Part2, &parsed.part2, counts.part2)?,
        part3: ordered(QuestionPart::Part3, &parsed.part3, counts.part3)?,
    })
}

/// Parses the supplied parts and keeps the stored keys for the others. A kept part must
/// still cover the declared count.
fn merge_manual(
    manual: &ManualAnswers,
    declared: &PartCounts,
    existing: Option<&ExamPaper>,
) -> Result<AnswerKeySet, SyncError> {
    if manual.part1.is_none() && manual.part2.is_none() && manual.part3.is_none() {
        return Err(SyncError::InvalidPaper("no answers supplied".to_string()));
    }

    let mut keys = existing.map(|paper| paper.answer_key.0.clone()).unwrap_or_default();

    match &manual.part1 {
        Some(text) => {
            let parsed = parse_part_lines(QuestionPart::Part1, text)?;
            keys.part1 = ordered(QuestionPart::Part1, &parsed.part1, declared.part1)?;
        }
        None => check_kept(QuestionPart::Part1, keys.part1.len(), declared)?,
    }
    match &manual.part2 {
        Some(text) => {
            let parsed = parse_part_lines(QuestionPart::Part2, text)?;
            keys.part2 = ordered(QuestionPart::Part2, &parsed.part2, declared.part2)?;
        }
        None => check_kept(QuestionPart::Part2, keys.part2.len(), declared)?,
    }
    match &manual.part3 {
        Some(text) => {
            let parsed = parse_part_lines(QuestionPart::Part3, text)?;
            keys.part3 = ordered(QuestionPart::Part3, &parsed.part3, declared.part3)?;
        }
        None => check_kept(QuestionPart::Part3, keys.part3.len(), declared)?,
    }

    Ok(keys)
}

fn check_kept(part: QuestionPart, kept: usize, declared: &PartCounts) -> Result<(), SyncError> {
    let numbers: Vec<u32> = (1..=kept as u32).collect();
    check_coverage(part, &numbers, declared.get(part))
}
