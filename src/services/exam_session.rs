//! Candidate session transitions. Every function here works on a record the caller
//! already holds exclusively; persistence and locking live in `stores`.

use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::types::Json;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{AnswerSheet, ExamSession};
use crate::db::types::{LockState, SubmissionState};
use crate::schemas::answers::CandidateAnswers;
use crate::services::scoring::ScoreReport;
use crate::services::stores::{SessionRecord, StoreError};

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("session is locked after {violations} violations")]
    SessionLocked { violations: i32 },
    #[error("session has already been submitted")]
    SessionFinalized,
    #[error("session has not started")]
    SessionNotStarted,
    #[error("session has not been submitted")]
    SessionNotSubmitted,
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("contest {0} has no exam paper configured")]
    NoPaperConfigured(String),
    #[error("paper {code} does not exist in contest {contest_id}")]
    UnknownPaper { contest_id: String, code: String },
    #[error("paper assignment changed during scoring")]
    PaperChanged,
    #[error("invalid answers: {0}")]
    InvalidAnswers(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionPolicy {
    pub(crate) violation_threshold: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViolationOutcome {
    pub(crate) violation_count: i32,
    pub(crate) locked: bool,
    /// True only for the violation that crossed the threshold.
    pub(crate) newly_locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AdminOverride {
    pub(crate) reset_violations: bool,
    pub(crate) unlock: bool,
    pub(crate) reassign_paper: Option<String>,
}

/// Uniform draw over the contest's paper codes; a single paper is always chosen.
pub(crate) fn draw_paper_code<R: Rng + ?Sized>(codes: &[String], rng: &mut R) -> Option<String> {
    match codes {
        [] => None,
        [only] => Some(only.clone()),
        _ => codes.choose(rng).cloned(),
    }
}

/// Fresh in-progress session with an empty sheet.
pub(crate) fn new_session(
    contest_id: &str,
    candidate_id: &str,
    paper_code: String,
    now: PrimitiveDateTime,
) -> SessionRecord {
    let id = Uuid::new_v4().to_string();
    SessionRecord {
        session: ExamSession {
            id: id.clone(),
            contest_id: contest_id.to_string(),
            candidate_id: candidate_id.to_string(),
            paper_code,
            violation_count: 0,
            lock_state: LockState::Unlocked,
            submission_state: SubmissionState::InProgress,
            started_at: Some(now),
            finalized_at: None,
            created_at: now,
            updated_at: now,
        },
        sheet: AnswerSheet {
            session_id: id,
            answers: Json(CandidateAnswers::default()),
            saved_at: None,
            finalized: false,
            final_report: None,
            updated_at: now,
        },
    }
}

/// Candidate-facing writes need an in-progress, unlocked session.
pub(crate) fn ensure_writable(record: &SessionRecord) -> Result<(), SessionError> {
    match record.session.submission_state {
        SubmissionState::Finalized => return Err(SessionError::SessionFinalized),
        SubmissionState::NotStarted => return Err(SessionError::SessionNotStarted),
        SubmissionState::InProgress => {}
    }
    if record.session.lock_state == LockState::Locked {
        return Err(SessionError::SessionLocked { violations: record.session.violation_count });
    }
    Ok(())
}

pub(crate) fn save_answers(
    record: &mut SessionRecord,
    answers: CandidateAnswers,
    now: PrimitiveDateTime,
) -> Result<(), SessionError> {
    ensure_writable(record)?;

    record.sheet.answers = Json(answers);
    record.sheet.saved_at = Some(now);
    record.sheet.updated_at = now;
    record.session.updated_at = now;
    Ok(())
}

/// Counts one integrity event. Locked sessions still accrue; submitted ones do not.
pub(crate) fn record_violation(
    record: &mut SessionRecord,
    policy: SessionPolicy,
    now: PrimitiveDateTime,
) -> Result<ViolationOutcome, SessionError> {
    match record.session.submission_state {
        SubmissionState::Finalized => return Err(SessionError::SessionFinalized),
        SubmissionState::NotStarted => return Err(SessionError::SessionNotStarted),
        SubmissionState::InProgress => {}
    }

    let session = &mut record.session;
    session.violation_count = session.violation_count.saturating_add(1);
    session.updated_at = now;

    let threshold = i32::try_from(policy.violation_threshold).unwrap_or(i32::MAX);
    let newly_locked =
        session.lock_state == LockState::Unlocked && session.violation_count >= threshold;
    if newly_locked {
        session.lock_state = LockState::Locked;
    }

    Ok(ViolationOutcome {
        violation_count: session.violation_count,
        locked: session.lock_state == LockState::Locked,
        newly_locked,
    })
}

/// Finalizes the session with `report`, which must be scored against the session's
/// current paper.
pub(crate) fn submit(
    record: &mut SessionRecord,
    report: ScoreReport,
    now: PrimitiveDateTime,
) -> Result<(), SessionError> {
    ensure_writable(record)?;
    if report.paper_code != record.session.paper_code {
        return Err(SessionError::PaperChanged);
    }

    record.session.submission_state = SubmissionState::Finalized;
    record.session.finalized_at = Some(now);
    record.session.updated_at = now;
    record.sheet.finalized = true;
    record.sheet.final_report = Some(Json(report));
    record.sheet.updated_at = now;
    Ok(())
}

/// Swaps the stored report of a finalized sheet for one recomputed against the same paper.
/// The submitted answers stay untouched.
pub(crate) fn replace_final_report(
    record: &mut SessionRecord,
    report: ScoreReport,
    now: PrimitiveDateTime,
) -> Result<(), SessionError> {
    if record.session.submission_state != SubmissionState::Finalized {
        return Err(SessionError::SessionNotSubmitted);
    }
    let scored_code = record.sheet.final_report.as_ref().map(|stored| stored.paper_code.as_str());
    if scored_code != Some(report.paper_code.as_str()) {
        return Err(SessionError::PaperChanged);
    }

    record.sheet.final_report = Some(Json(report));
    record.sheet.updated_at = now;
    Ok(())
}

/// Privileged transition, allowed in every state. Never reopens a submission.
pub(crate) fn admin_override(
    record: &mut SessionRecord,
    request: &AdminOverride,
    now: PrimitiveDateTime,
) {
    let session = &mut record.session;
    if request.reset_violations {
        session.violation_count = 0;
    }
    if request.unlock {
        session.lock_state = LockState::Unlocked;
    }
    if let Some(code) = &request.reassign_paper {
        session.paper_code = code.clone();
    }
    session.updated_at = now;
}
