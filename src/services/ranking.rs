//! Read projection of a contest for the public ranking board.

use std::cmp::Ordering;

use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::types::{LockState, QuestionPart, SubmissionState};
use crate::services::exam_session::SessionError;
use crate::services::scoring::{Points, ScoreReport};
use crate::services::sessions::SessionService;
use crate::services::stores::{SessionRecord, SessionStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PartProgress {
    pub(crate) part: QuestionPart,
    pub(crate) correct_units: u32,
    pub(crate) total_units: u32,
    pub(crate) points: Points,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RankingRow {
    pub(crate) rank: usize,
    pub(crate) candidate_id: String,
    pub(crate) session_id: String,
    pub(crate) paper_code: String,
    pub(crate) normalized_score: Points,
    pub(crate) per_part: Vec<PartProgress>,
    pub(crate) violation_count: i32,
    pub(crate) lock_state: LockState,
    pub(crate) submission_state: SubmissionState,
    pub(crate) finalized_at: Option<String>,
}

/// A session paired with the report it is ranked by.
pub(crate) struct RankedEntry {
    pub(crate) record: SessionRecord,
    pub(crate) report: ScoreReport,
}

/// Score descending, then fewer violations, then earlier submission. Unsubmitted rows
/// sort after submitted ones with the same score and violations.
pub(crate) fn compare_entries(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.report
        .normalized_score
        .cmp(&a.report.normalized_score)
        .then_with(|| a.record.session.violation_count.cmp(&b.record.session.violation_count))
        .then_with(|| match (a.record.session.finalized_at, b.record.session.finalized_at) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.record.session.candidate_id.cmp(&b.record.session.candidate_id))
}

pub(crate) fn rank(mut entries: Vec<RankedEntry>) -> Vec<RankingRow> {
    entries.sort_by(compare_entries);
    entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            let session = entry.record.session;
            RankingRow {
                rank: idx + 1,
                candidate_id: session.candidate_id,
                session_id: session.id,
                paper_code: entry.report.paper_code,
                normalized_score: entry.report.normalized_score,
                per_part: entry
                    .report
                    .parts
                    .iter()
                    .map(|part| PartProgress {
                        part: part.part,
                        correct_units: part.correct_units,
                        total_units: part.total_units,
                        points: part.points,
                    })
                    .collect(),
                violation_count: session.violation_count,
                lock_state: session.lock_state,
                submission_state: session.submission_state,
                finalized_at: session.finalized_at.map(format_primitive),
            }
        })
        .collect()
}

/// Submitted sessions, plus in-progress ones scored live when `live` is set.
pub(crate) async fn contest_ranking(
    sessions: &dyn SessionStore,
    service: &SessionService<'_>,
    contest_id: &str,
    live: bool,
) -> Result<Vec<RankingRow>, SessionError> {
    let records = sessions.list_for_contest(contest_id).await?;
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let include = match record.session.submission_state {
            SubmissionState::Finalized => true,
            SubmissionState::InProgress => live,
            SubmissionState::NotStarted => false,
        };
        if !include {
            continue;
        }
        match service.report(&record).await {
            Ok(Some(report)) => entries.push(RankedEntry { record, report }),
            Ok(None) => {}
            Err(SessionError::UnknownPaper { code, .. }) => {
                tracing::warn!(
                    contest_id,
                    session_id = %record.session.id,
                    paper_code = %code,
                    "Session left out of ranking, paper missing"
                );
            }
            Err(err) => return Err(err),
        }
    }

    Ok(rank(entries))
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::core::config::{ExamSettings, ShortAnswerMatch};
    use crate::core::time::primitive_now_utc;
    use crate::schemas::answers::{CandidateAnswers, Choice};
    use crate::services::exam_session::{new_session, AdminOverride};
    use crate::services::scoring::score_sheet;
    use crate::services::stores::memory::MemoryStore;
    use crate::test_support::{exam_settings, paper_fixture, seed_paper};

    fn entry(candidate: &str, score: i64, violations: i32, finalized_after: Option<i64>) -> RankedEntry {
        let now = primitive_now_utc();
        let mut record = new_session("thptqg-2025", candidate, "101".to_string(), now);
        record.session.violation_count = violations;
        if let Some(seconds) = finalized_after {
            record.session.submission_state = SubmissionState::Finalized;
            record.session.finalized_at = Some(now + Duration::seconds(seconds));
        }
        let mut report = score_sheet(
            &paper_fixture("thptqg-2025", "101"),
            &CandidateAnswers::default(),
            ShortAnswerMatch::Whitespace,
        );
        report.normalized_score = Points::from_centi(score);
        RankedEntry { record, report }
    }

    fn candidates(rows: &[RankingRow]) -> Vec<&str> {
        rows.iter().map(|row| row.candidate_id.as_str()).collect()
    }

    #[test]
    fn orders_by_score_then_violations_then_time() {
        let rows = rank(vec![
            entry("late", 850, 0, Some(30)),
            entry("low", 400, 0, Some(1)),
            entry("early", 850, 0, Some(10)),
            entry("noisy", 850, 3, Some(5)),
            entry("top", 975, 4, Some(60)),
        ]);

        assert_eq!(candidates(&rows), vec!["top", "early", "late", "noisy", "low"]);
        assert_eq!(rows.iter().map(|row| row.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(rows[0].per_part.len(), 3);
    }

    #[test]
    fn unsubmitted_rows_follow_submitted_ties() {
        let rows = rank(vec![entry("live", 500, 0, None), entry("done", 500, 0, Some(100))]);
        assert_eq!(candidates(&rows), vec!["done", "live"]);
        assert!(rows[1].finalized_at.is_none());
    }

    #[tokio::test]
    async fn finalized_rows_show_the_scored_paper() {
        let store = MemoryStore::new();
        seed_paper(&store, "thptqg-2025", "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);

        let done = service.enter("thptqg-2025", "cand-done").await.expect("enter").record;
        service.submit(&done.session.id).await.expect("submit");
        seed_paper(&store, "thptqg-2025", "102").await;
        let reassigned = AdminOverride {
            reset_violations: false,
            unlock: false,
            reassign_paper: Some("102".to_string()),
        };
        let record =
            service.admin_override(&done.session.id, reassigned).await.expect("override");
        assert_eq!(record.session.paper_code, "102");

        let rows = contest_ranking(&store, &service, "thptqg-2025", false).await.expect("ranking");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].paper_code, "101");
    }

    #[tokio::test]
    async fn live_sessions_follow_configuration() {
        let store = MemoryStore::new();
        seed_paper(&store, "thptqg-2025", "101").await;
        let exam = exam_settings();
        let service = SessionService::new(&store, &store, &exam);

        let done = service.enter("thptqg-2025", "cand-done").await.expect("enter").record;
        let mut sheet = CandidateAnswers::default();
        sheet.part1.insert(1, Choice::A);
        service.save_answers(&done.session.id, sheet).await.expect("save");
        service.submit(&done.session.id).await.expect("submit");
        service.enter("thptqg-2025", "cand-live").await.expect("enter");

        let rows = contest_ranking(&store, &service, "thptqg-2025", false).await.expect("ranking");
        assert_eq!(candidates(&rows), vec!["cand-done"]);

        let live = ExamSettings { live_ranking: true, ..exam_settings() };
        let service = SessionService::new(&store, &store, &live);
        let rows = contest_ranking(&store, &service, "thptqg-2025", true).await.expect("ranking");
        assert_eq!(candidates(&rows), vec!["cand-done", "cand-live"]);
        assert_eq!(rows[1].submission_state, SubmissionState::InProgress);
    }
}
