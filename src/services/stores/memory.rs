use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamPaper, ExamQuestion};
use crate::services::exam_session::SessionError;
use crate::services::scoring::question_max;
use crate::services::stores::{
    check_generated, PaperDraft, PaperStore, SessionMutation, SessionRecord, SessionStore,
    StoreError,
};

/// Keeps one lock per session so unrelated candidates never contend.
#[derive(Default)]
pub(crate) struct MemoryStore {
    papers: DashMap<(String, String), (ExamPaper, Vec<ExamQuestion>)>,
    sessions: DashMap<String, Arc<Mutex<SessionRecord>>>,
    by_candidate: DashMap<(String, String), String>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn find_paper(
        &self,
        contest_id: &str,
        code: &str,
    ) -> Result<Option<ExamPaper>, StoreError> {
        let key = (contest_id.to_string(), code.to_string());
        Ok(self.papers.get(&key).map(|entry| entry.0.clone()))
    }

    async fn list_papers(&self, contest_id: &str) -> Result<Vec<ExamPaper>, StoreError> {
        let mut papers: Vec<ExamPaper> = self
            .papers
            .iter()
            .filter(|entry| entry.key().0 == contest_id)
            .map(|entry| entry.value().0.clone())
            .collect();
        papers.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(papers)
    }

    async fn list_questions(&self, paper_id: &str) -> Result<Vec<ExamQuestion>, StoreError> {
        Ok(self
            .papers
            .iter()
            .find(|entry| entry.value().0.id == paper_id)
            .map(|entry| entry.value().1.clone())
            .unwrap_or_default())
    }

    async fn replace_paper(&self, draft: PaperDraft) -> Result<ExamPaper, StoreError> {
        check_generated(&draft.counts, draft.keys.iter_keys().map(|(part, _, _)| part))?;

        let now = primitive_now_utc();
        let key = (draft.contest_id.clone(), draft.code.clone());

        let mut entry = self.papers.entry(key).or_insert_with(|| {
            let paper = ExamPaper {
                id: Uuid::new_v4().to_string(),
                contest_id: draft.contest_id.clone(),
                code: draft.code.clone(),
                subject: draft.subject,
                part1_count: 0,
                part2_count: 0,
                part3_count: 0,
                answer_key: sqlx::types::Json(Default::default()),
                source_document: None,
                revision: 0,
                created_at: now,
                updated_at: now,
            };
            (paper, Vec::new())
        });

        let (paper, questions) = entry.value_mut();
        paper.subject = draft.subject;
        paper.part1_count = draft.counts.part1 as i32;
        paper.part2_count = draft.counts.part2 as i32;
        paper.part3_count = draft.counts.part3 as i32;
        paper.source_document = draft.source_document.clone().map(sqlx::types::Json);
        paper.revision += 1;
        paper.updated_at = now;
        *questions = draft
            .keys
            .iter_keys()
            .map(|(part, number, answer)| ExamQuestion {
                id: Uuid::new_v4().to_string(),
                paper_id: paper.id.clone(),
                part,
                number: number as i32,
                answer: sqlx::types::Json(answer),
                max_points_centi: question_max(part, draft.subject).centi() as i32,
                created_at: now,
            })
            .collect();
        paper.answer_key = sqlx::types::Json(draft.keys);

        Ok(paper.clone())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_if_absent(
        &self,
        record: SessionRecord,
    ) -> Result<(SessionRecord, bool), StoreError> {
        let key = (record.session.contest_id.clone(), record.session.candidate_id.clone());

        let existing_id = match self.by_candidate.entry(key) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                self.sessions
                    .insert(record.session.id.clone(), Arc::new(Mutex::new(record.clone())));
                vacant.insert(record.session.id.clone());
                return Ok((record, true));
            }
        };

        let existing = self.find(&existing_id).await?.ok_or_else(|| {
            StoreError::Inconsistent(format!("session {existing_id} missing from memory store"))
        })?;
        Ok((existing, false))
    }

    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let Some(slot) = self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
        else {
            return Ok(None);
        };
        let record = slot.lock().await.clone();
        Ok(Some(record))
    }

    async fn find_for_candidate(
        &self,
        contest_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let key = (contest_id.to_string(), candidate_id.to_string());
        let Some(session_id) = self.by_candidate.get(&key).map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        self.find(&session_id).await
    }

    async fn list_for_contest(&self, contest_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let ids: Vec<String> = self
            .by_candidate
            .iter()
            .filter(|entry| entry.key().0 == contest_id)
            .map(|entry| entry.value().clone())
            .collect();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.find(&id).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.session.created_at.cmp(&b.session.created_at));
        Ok(records)
    }

    async fn update(
        &self,
        session_id: &str,
        mutation: SessionMutation<'_>,
    ) -> Result<SessionRecord, SessionError> {
        let slot = self
            .sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;

        let mut guard = slot.lock().await;
        let mut record = guard.clone();
        mutation(&mut record)?;
        *guard = record.clone();
        Ok(record)
    }
}
