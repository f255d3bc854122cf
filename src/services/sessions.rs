use std::collections::HashMap;

use crate::core::config::ExamSettings;
use crate::core::metrics::{LOCKOUTS_TOTAL, SUBMISSIONS_TOTAL, VIOLATIONS_TOTAL};
use crate::core::time::primitive_now_utc;
use crate::db::models::ExamPaper;
use crate::db::types::{QuestionPart, SubmissionState};
use crate::schemas::answers::CandidateAnswers;
use crate::schemas::paper::paper_counts;
use crate::services::exam_session::{
    self, AdminOverride, SessionError, SessionPolicy, ViolationOutcome,
};
use crate::services::scoring::{score_sheet, ScoreReport};
use crate::services::stores::{PaperStore, SessionRecord, SessionStore, StoreError};

/// Attempts before a submit racing a paper reassignment gives up.
const SUBMIT_ATTEMPTS: usize = 3;

/// Session operations over the configured stores.
#[derive(Clone, Copy)]
pub(crate) struct SessionService<'a> {
    papers: &'a dyn PaperStore,
    sessions: &'a dyn SessionStore,
    exam: &'a ExamSettings,
}

#[derive(Debug, Clone)]
pub(crate) struct EnterOutcome {
    pub(crate) record: SessionRecord,
    pub(crate) created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RescoreSummary {
    pub(crate) rescored: usize,
    pub(crate) live: usize,
    pub(crate) skipped_finalized: usize,
}

impl<'a> SessionService<'a> {
    pub(crate) fn new(
        papers: &'a dyn PaperStore,
        sessions: &'a dyn SessionStore,
        exam: &'a ExamSettings,
    ) -> Self {
        Self { papers, sessions, exam }
    }

    fn policy(&self) -> SessionPolicy {
        SessionPolicy { violation_threshold: self.exam.violation_threshold }
    }

    /// Idempotent first entry. Concurrent first entries resolve to one stored session.
    pub(crate) async fn enter(
        &self,
        contest_id: &str,
        candidate_id: &str,
    ) -> Result<EnterOutcome, SessionError> {
        if let Some(record) = self.sessions.find_for_candidate(contest_id, candidate_id).await? {
            return Ok(EnterOutcome { record, created: false });
        }

        let mut codes: Vec<String> =
            self.papers.list_papers(contest_id).await?.into_iter().map(|paper| paper.code).collect();
        codes.sort();

        let drawn = {
            let mut rng = rand::thread_rng();
            exam_session::draw_paper_code(&codes, &mut rng)
        };
        let Some(paper_code) = drawn else {
            return Err(SessionError::NoPaperConfigured(contest_id.to_string()));
        };

        let fresh =
            exam_session::new_session(contest_id, candidate_id, paper_code, primitive_now_utc());
        let (record, created) = self.sessions.insert_if_absent(fresh).await?;

        if created {
            tracing::info!(
                contest_id,
                candidate_id,
                session_id = %record.session.id,
                paper_code = %record.session.paper_code,
                "Exam session started"
            );
        }
        Ok(EnterOutcome { record, created })
    }

    pub(crate) async fn get(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        self.sessions
            .find(session_id)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    /// Replaces the in-progress sheet. Question numbers must exist on the assigned paper.
    pub(crate) async fn save_answers(
        &self,
        session_id: &str,
        answers: CandidateAnswers,
    ) -> Result<SessionRecord, SessionError> {
        for _ in 0..SUBMIT_ATTEMPTS {
            let current = self.get(session_id).await?;
            exam_session::ensure_writable(&current)?;
            let paper = self.paper_for(&current).await?;
            check_answer_numbers(&paper, &answers)?;

            let now = primitive_now_utc();
            let sheet = answers.clone();
            let result = self
                .sessions
                .update(
                    session_id,
                    Box::new(move |record: &mut SessionRecord| {
                        if record.session.paper_code != paper.code {
                            return Err(SessionError::PaperChanged);
                        }
                        exam_session::save_answers(record, sheet, now)
                    }),
                )
                .await;

            match result {
                Err(SessionError::PaperChanged) => continue,
                other => return other,
            }
        }
        Err(SessionError::PaperChanged)
    }

    pub(crate) async fn record_violation(
        &self,
        session_id: &str,
    ) -> Result<(SessionRecord, ViolationOutcome), SessionError> {
        let policy = self.policy();
        let now = primitive_now_utc();
        let mut outcome = None;

        let record = self
            .sessions
            .update(
                session_id,
                Box::new(|record: &mut SessionRecord| {
                    outcome = Some(exam_session::record_violation(record, policy, now)?);
                    Ok(())
                }),
            )
            .await?;
        let outcome = outcome.ok_or_else(|| {
            StoreError::Inconsistent(format!("violation on session {session_id} was not applied"))
        })?;

        metrics::counter!(VIOLATIONS_TOTAL).increment(1);
        if outcome.newly_locked {
            metrics::counter!(LOCKOUTS_TOTAL).increment(1);
            tracing::warn!(
                session_id,
                candidate_id = %record.session.candidate_id,
                violation_count = outcome.violation_count,
                "Exam session locked after repeated violations"
            );
        } else {
            tracing::info!(
                session_id,
                violation_count = outcome.violation_count,
                locked = outcome.locked,
                "Exam violation recorded"
            );
        }

        Ok((record, outcome))
    }

    /// Scores the locked sheet against the session's current paper and finalizes it.
    pub(crate) async fn submit(&self, session_id: &str) -> Result<SessionRecord, SessionError> {
        let mode = self.exam.short_answer_match;

        for attempt in 1..=SUBMIT_ATTEMPTS {
            let current = self.get(session_id).await?;
            exam_session::ensure_writable(&current)?;
            let paper = self.paper_for(&current).await?;

            let now = primitive_now_utc();
            let result = self
                .sessions
                .update(
                    session_id,
                    Box::new(move |record: &mut SessionRecord| {
                        let report = score_sheet(&paper, &record.sheet.answers.0, mode);
                        exam_session::submit(record, report, now)
                    }),
                )
                .await;

            match result {
                Ok(record) => {
                    metrics::counter!(SUBMISSIONS_TOTAL).increment(1);
                    let score = record
                        .sheet
                        .final_report
                        .as_ref()
                        .map(|report| report.normalized_score.as_f64())
                        .unwrap_or_default();
                    tracing::info!(
                        session_id,
                        candidate_id = %record.session.candidate_id,
                        paper_code = %record.session.paper_code,
                        normalized_score = score,
                        "Exam session submitted"
                    );
                    return Ok(record);
                }
                Err(SessionError::PaperChanged) => {
                    tracing::debug!(session_id, attempt, "Paper reassigned during submit, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(SessionError::PaperChanged)
    }

    /// Privileged transition; a reassigned paper must exist in the session's contest.
    pub(crate) async fn admin_override(
        &self,
        session_id: &str,
        request: AdminOverride,
    ) -> Result<SessionRecord, SessionError> {
        let current = self.get(session_id).await?;
        if let Some(code) = &request.reassign_paper {
            let contest_id = &current.session.contest_id;
            if self.papers.find_paper(contest_id, code).await?.is_none() {
                return Err(SessionError::UnknownPaper {
                    contest_id: contest_id.clone(),
                    code: code.clone(),
                });
            }
        }

        let now = primitive_now_utc();
        let applied = request.clone();
        let record = self
            .sessions
            .update(
                session_id,
                Box::new(move |record: &mut SessionRecord| {
                    exam_session::admin_override(record, &applied, now);
                    Ok(())
                }),
            )
            .await?;

        tracing::warn!(
            session_id,
            candidate_id = %record.session.candidate_id,
            reset_violations = request.reset_violations,
            unlock = request.unlock,
            reassign_paper = request.reassign_paper.as_deref().unwrap_or("-"),
            "Administrative override applied"
        );
        Ok(record)
    }

    /// The stored report of a submitted session, or a live score of the current sheet.
    pub(crate) async fn report(
        &self,
        record: &SessionRecord,
    ) -> Result<Option<ScoreReport>, SessionError> {
        match record.session.submission_state {
            SubmissionState::Finalized => {
                Ok(record.sheet.final_report.as_ref().map(|report| report.0.clone()))
            }
            SubmissionState::InProgress => {
                let paper = self.paper_for(record).await?;
                Ok(Some(score_sheet(&paper, &record.sheet.answers.0, self.exam.short_answer_match)))
            }
            SubmissionState::NotStarted => Ok(None),
        }
    }

    /// Recomputes finalized reports against the paper each was scored with, when allowed.
    /// In-progress sheets are always scored live and only counted.
    pub(crate) async fn rescore(&self, contest_id: &str) -> Result<RescoreSummary, SessionError> {
        let records = self.sessions.list_for_contest(contest_id).await?;
        let papers: HashMap<String, ExamPaper> = self
            .papers
            .list_papers(contest_id)
            .await?
            .into_iter()
            .map(|paper| (paper.code.clone(), paper))
            .collect();
        let mode = self.exam.short_answer_match;
        let mut summary = RescoreSummary::default();

        for record in records {
            match record.session.submission_state {
                SubmissionState::InProgress => summary.live += 1,
                SubmissionState::NotStarted => {}
                SubmissionState::Finalized if !self.exam.rescore_finalized => {
                    summary.skipped_finalized += 1;
                }
                SubmissionState::Finalized => {
                    let Some(scored_code) =
                        record.sheet.final_report.as_ref().map(|report| report.paper_code.clone())
                    else {
                        summary.skipped_finalized += 1;
                        continue;
                    };
                    let Some(paper) = papers.get(&scored_code) else {
                        tracing::warn!(
                            contest_id,
                            session_id = %record.session.id,
                            paper_code = %scored_code,
                            "Finalized report refers to a missing paper"
                        );
                        summary.skipped_finalized += 1;
                        continue;
                    };

                    let now = primitive_now_utc();
                    self.sessions
                        .update(
                            &record.session.id,
                            Box::new(move |locked: &mut SessionRecord| {
                                let report = score_sheet(paper, &locked.sheet.answers.0, mode);
                                exam_session::replace_final_report(locked, report, now)
                            }),
                        )
                        .await?;
                    summary.rescored += 1;
                }
            }
        }

        tracing::info!(
            contest_id,
            rescored = summary.rescored,
            live = summary.live,
            skipped_finalized = summary.skipped_finalized,
            "Contest rescored"
        );
        Ok(summary)
    }

    async fn paper_for(&self, record: &SessionRecord) -> Result<ExamPaper, SessionError> {
        let session = &record.session;
        self.papers.find_paper(&session.contest_id, &session.paper_code).await?.ok_or_else(|| {
            SessionError::UnknownPaper {
                contest_id: session.contest_id.clone(),
                code: session.paper_code.clone(),
            }
        })
    }
}

fn check_answer_numbers(paper: &ExamPaper, answers: &CandidateAnswers) -> Result<(), SessionError> {
    let counts = paper_counts(paper);
    let answered: [(QuestionPart, Vec<u32>); 3] = [
        (QuestionPart::Part1, answers.part1.keys().copied().collect()),
        (QuestionPart::Part2, answers.part2.keys().copied().collect()),
        (QuestionPart::Part3, answers.part3.keys().copied().collect()),
    ];

    for (part, numbers) in answered {
        let count = counts.get(part);
        if let Some(number) = numbers.into_iter().find(|number| *number == 0 || *number > count) {
            return Err(SessionError::InvalidAnswers(format!(
                "{part} has no question {number} on paper {}",
                paper.code
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::config::ShortAnswerMatch;
    use crate::db::types::LockState;
    use crate::schemas::answers::Choice;
    use crate::services::stores::memory::MemoryStore;
    use crate::test_support::{exam_settings, seed_paper};

    const CONTEST: &str = "thptqg-2025";

    fn answers(choice: Choice) -> CandidateAnswers {
        let mut answers = CandidateAnswers::default();
        answers.part1.insert(1, choice);
        answers
    }

    #[tokio::test]
    async fn enter_is_idempotent() {
        let store = MemoryStore::new();
        seed_paper(&store, CONTEST, "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);

        let first = service.enter(CONTEST, "cand-1").await.expect("enter");
        let second = service.enter(CONTEST, "cand-1").await.expect("re-enter");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record, second.record);
        assert_eq!(first.record.session.paper_code, "101");
    }

    #[tokio::test]
    async fn enter_without_papers_fails() {
        let store = MemoryStore::new();
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);

        let err = service.enter(CONTEST, "cand-1").await.unwrap_err();
        assert!(matches!(err, SessionError::NoPaperConfigured(_)));
    }

    #[tokio::test]
    async fn racing_first_entries_share_one_session() {
        let store = Arc::new(MemoryStore::new());
        for code in ["101", "102", "103", "104"] {
            seed_paper(store.as_ref(), CONTEST, code).await;
        }
        let exam = Arc::new(exam_settings());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let exam = Arc::clone(&exam);
            handles.push(tokio::spawn(async move {
                let service = SessionService::new(store.as_ref(), store.as_ref(), exam.as_ref());
                service.enter(CONTEST, "cand-race").await.expect("enter")
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.expect("join"));
        }
        assert_eq!(outcomes.iter().filter(|outcome| outcome.created).count(), 1);
        let winner = &outcomes[0].record.session;
        assert!(outcomes.iter().all(|outcome| outcome.record.session.id == winner.id));
        assert!(outcomes.iter().all(|outcome| outcome.record.session.paper_code == winner.paper_code));
    }

    #[tokio::test]
    async fn concurrent_violations_are_all_counted() {
        let store = Arc::new(MemoryStore::new());
        seed_paper(store.as_ref(), CONTEST, "101").await;
        let exam = Arc::new(ExamSettings { violation_threshold: 5, ..exam_settings() });
        let session_id = SessionService::new(store.as_ref(), store.as_ref(), exam.as_ref())
            .enter(CONTEST, "cand-1")
            .await
            .expect("enter")
            .record
            .session
            .id;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let store = Arc::clone(&store);
            let exam = Arc::clone(&exam);
            let session_id = session_id.clone();
            handles.push(tokio::spawn(async move {
                SessionService::new(store.as_ref(), store.as_ref(), exam.as_ref())
                    .record_violation(&session_id)
                    .await
                    .expect("violation")
                    .1
            }));
        }

        let mut newly_locked = 0;
        for handle in handles {
            if handle.await.expect("join").newly_locked {
                newly_locked += 1;
            }
        }
        assert_eq!(newly_locked, 1);

        let record = store.find(&session_id).await.expect("find").expect("session");
        assert_eq!(record.session.violation_count, 12);
        assert_eq!(record.session.lock_state, LockState::Locked);
    }

    #[tokio::test]
    async fn submit_scores_and_freezes() {
        let store = MemoryStore::new();
        seed_paper(&store, CONTEST, "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);
        let session_id = service.enter(CONTEST, "cand-1").await.expect("enter").record.session.id;

        service.save_answers(&session_id, answers(Choice::A)).await.expect("save");
        let record = service.submit(&session_id).await.expect("submit");
        let report = record.sheet.final_report.as_ref().expect("report");
        assert_eq!(report.paper_code, "101");
        assert!(report.raw_points.centi() > 0);

        let err = service.save_answers(&session_id, answers(Choice::B)).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionFinalized));
        let err = service.submit(&session_id).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionFinalized));
        assert_eq!(store.find(&session_id).await.expect("find").expect("session"), record);
    }

    #[tokio::test]
    async fn out_of_range_answers_are_rejected() {
        let store = MemoryStore::new();
        seed_paper(&store, CONTEST, "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);
        let session_id = service.enter(CONTEST, "cand-1").await.expect("enter").record.session.id;

        let mut sheet = CandidateAnswers::default();
        sheet.part3.insert(99, "1".to_string());
        let err = service.save_answers(&session_id, sheet).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidAnswers(_)));
    }

    #[tokio::test]
    async fn reassignment_changes_scoring_key() {
        let store = MemoryStore::new();
        seed_paper(&store, CONTEST, "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);
        let session_id = service.enter(CONTEST, "cand-1").await.expect("enter").record.session.id;
        seed_paper(&store, CONTEST, "102").await;

        service.save_answers(&session_id, answers(Choice::A)).await.expect("save");
        let request =
            AdminOverride { reassign_paper: Some("102".to_string()), ..Default::default() };
        service.admin_override(&session_id, request).await.expect("override");

        let record = service.submit(&session_id).await.expect("submit");
        assert_eq!(record.sheet.final_report.as_ref().expect("report").paper_code, "102");

        let request =
            AdminOverride { reassign_paper: Some("999".to_string()), ..Default::default() };
        let err = service.admin_override(&session_id, request).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownPaper { .. }));
    }

    #[tokio::test]
    async fn rescore_respects_finalized_policy() {
        let store = MemoryStore::new();
        seed_paper(&store, CONTEST, "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);
        let submitted = service.enter(CONTEST, "cand-1").await.expect("enter").record.session.id;
        service.submit(&submitted).await.expect("submit");
        service.enter(CONTEST, "cand-2").await.expect("enter");

        let summary = service.rescore(CONTEST).await.expect("rescore");
        assert_eq!(summary, RescoreSummary { rescored: 0, live: 1, skipped_finalized: 1 });

        let permissive = ExamSettings {
            rescore_finalized: true,
            short_answer_match: ShortAnswerMatch::Alphanumeric,
            ..exam_settings()
        };
        let service = SessionService::new(&store, &store, &permissive);
        let summary = service.rescore(CONTEST).await.expect("rescore");
        assert_eq!(summary.rescored, 1);
    }
}
