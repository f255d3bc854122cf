//! Persistence seams of the engine. Postgres backs the service; tests run on the
//! in-memory variants.

#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{AnswerSheet, ExamPaper, ExamQuestion, ExamSession};
use crate::db::types::{QuestionPart, Subject};
use crate::schemas::answers::{AnswerKeySet, PartCounts};
use crate::schemas::paper::SourceDocument;
use crate::services::exam_session::SessionError;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored data is inconsistent: {0}")]
    Inconsistent(String),
}

/// A session together with the answer sheet it gates.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionRecord {
    pub(crate) session: ExamSession,
    pub(crate) sheet: AnswerSheet,
}

/// Validated replacement for a paper's configuration and keys.
#[derive(Debug, Clone)]
pub(crate) struct PaperDraft {
    pub(crate) contest_id: String,
    pub(crate) code: String,
    pub(crate) subject: Subject,
    pub(crate) counts: PartCounts,
    pub(crate) keys: AnswerKeySet,
    pub(crate) source_document: Option<SourceDocument>,
}

/// Question records generated for a draft must match its counts part by part.
pub(crate) fn check_generated(
    counts: &PartCounts,
    parts: impl IntoIterator<Item = QuestionPart>,
) -> Result<(), StoreError> {
    let mut generated = PartCounts { part1: 0, part2: 0, part3: 0 };
    for part in parts {
        match part {
            QuestionPart::Part1 => generated.part1 += 1,
            QuestionPart::Part2 => generated.part2 += 1,
            QuestionPart::Part3 => generated.part3 += 1,
        }
    }

    for part in QuestionPart::ALL {
        if generated.get(part) != counts.get(part) {
            tracing::error!(
                part = %part,
                expected = counts.get(part),
                generated = generated.get(part),
                "Question records diverge from the paper counts"
            );
            return Err(StoreError::Inconsistent(format!(
                "{part}: expected {} questions, generated {}",
                counts.get(part),
                generated.get(part)
            )));
        }
    }
    Ok(())
}

/// Runs against a private copy of the record; the copy is written back only on `Ok`.
pub(crate) type SessionMutation<'a> =
    Box<dyn FnOnce(&mut SessionRecord) -> Result<(), SessionError> + Send + 'a>;

#[async_trait]
pub(crate) trait PaperStore: Send + Sync {
    async fn find_paper(
        &self,
        contest_id: &str,
        code: &str,
    ) -> Result<Option<ExamPaper>, StoreError>;

    async fn list_papers(&self, contest_id: &str) -> Result<Vec<ExamPaper>, StoreError>;

    async fn list_questions(&self, paper_id: &str) -> Result<Vec<ExamQuestion>, StoreError>;

    /// Upserts the paper and regenerates its questions as one atomic step.
    async fn replace_paper(&self, draft: PaperDraft) -> Result<ExamPaper, StoreError>;
}

#[async_trait]
pub(crate) trait SessionStore: Send + Sync {
    /// First writer wins per `(contest, candidate)`; returns the stored record and
    /// whether this call created it.
    async fn insert_if_absent(
        &self,
        record: SessionRecord,
    ) -> Result<(SessionRecord, bool), StoreError>;

    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    async fn find_for_candidate(
        &self,
        contest_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    async fn list_for_contest(&self, contest_id: &str) -> Result<Vec<SessionRecord>, StoreError>;

    /// Applies `mutation` while holding the session exclusively.
    async fn update(
        &self,
        session_id: &str,
        mutation: SessionMutation<'_>,
    ) -> Result<SessionRecord, SessionError>;
}
