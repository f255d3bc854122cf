use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::time::format_primitive;
use crate::db::types::{LockState, SubmissionState};
use crate::schemas::answers::CandidateAnswers;
use crate::services::exam_session::{AdminOverride, ViolationOutcome};
use crate::services::scoring::ScoreReport;
use crate::services::stores::SessionRecord;

const MAX_SHORT_ANSWER_LEN: usize = 64;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswersRequest {
    #[validate(custom(function = "validate_short_answers"))]
    pub(crate) answers: CandidateAnswers,
}

fn validate_short_answers(answers: &CandidateAnswers) -> Result<(), ValidationError> {
    if answers.part3.values().any(|text| text.chars().count() > MAX_SHORT_ANSWER_LEN) {
        let mut error = ValidationError::new("short_answer_length");
        error.message = Some(
            format!("part3 answers must be at most {MAX_SHORT_ANSWER_LEN} characters").into(),
        );
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct AdminOverrideRequest {
    #[serde(default)]
    pub(crate) reset_violations: bool,
    #[serde(default)]
    pub(crate) unlock: bool,
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "reassign_paper must be 1-32 characters"))]
    pub(crate) reassign_paper: Option<String>,
}

impl From<AdminOverrideRequest> for AdminOverride {
    fn from(value: AdminOverrideRequest) -> Self {
        Self {
            reset_violations: value.reset_violations,
            unlock: value.unlock,
            reassign_paper: value.reassign_paper,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) contest_id: String,
    pub(crate) candidate_id: String,
    pub(crate) paper_code: String,
    pub(crate) violation_count: i32,
    pub(crate) lock_state: LockState,
    pub(crate) submission_state: SubmissionState,
    pub(crate) started_at: Option<String>,
    pub(crate) finalized_at: Option<String>,
    pub(crate) answers: CandidateAnswers,
    pub(crate) saved_at: Option<String>,
}

impl From<SessionRecord> for SessionResponse {
    fn from(record: SessionRecord) -> Self {
        let SessionRecord { session, sheet } = record;
        Self {
            id: session.id,
            contest_id: session.contest_id,
            candidate_id: session.candidate_id,
            paper_code: session.paper_code,
            violation_count: session.violation_count,
            lock_state: session.lock_state,
            submission_state: session.submission_state,
            started_at: session.started_at.map(format_primitive),
            finalized_at: session.finalized_at.map(format_primitive),
            answers: sheet.answers.0,
            saved_at: sheet.saved_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EnterResponse {
    pub(crate) created: bool,
    pub(crate) session: SessionResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationResponse {
    pub(crate) violation_count: i32,
    pub(crate) locked: bool,
    pub(crate) newly_locked: bool,
    /// Violations left before the session locks; zero once locked.
    pub(crate) warnings_left: u32,
}

impl ViolationResponse {
    pub(crate) fn new(outcome: ViolationOutcome, threshold: u32) -> Self {
        let count = u32::try_from(outcome.violation_count).unwrap_or_default();
        Self {
            violation_count: outcome.violation_count,
            locked: outcome.locked,
            newly_locked: outcome.newly_locked,
            warnings_left: if outcome.locked { 0 } else { threshold.saturating_sub(count) },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) session_id: String,
    pub(crate) candidate_id: String,
    pub(crate) submission_state: SubmissionState,
    pub(crate) finalized_at: Option<String>,
    pub(crate) report: ScoreReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_count_down_to_lock() {
        let outcome = ViolationOutcome { violation_count: 3, locked: false, newly_locked: false };
        assert_eq!(ViolationResponse::new(outcome, 5).warnings_left, 2);

        let outcome = ViolationOutcome { violation_count: 5, locked: true, newly_locked: true };
        assert_eq!(ViolationResponse::new(outcome, 5).warnings_left, 0);
    }

    #[test]
    fn long_short_answers_fail_validation() {
        let mut answers = CandidateAnswers::default();
        answers.part3.insert(1, "9".repeat(MAX_SHORT_ANSWER_LEN + 1));
        let request = SaveAnswersRequest { answers };
        assert!(request.validate().is_err());

        let request: AdminOverrideRequest =
            serde_json::from_value(serde_json::json!({ "reassign_paper": "" })).expect("request");
        assert!(request.validate().is_err());
    }
}
