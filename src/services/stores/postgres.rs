use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamPaper, ExamQuestion};
use crate::repositories;
use crate::repositories::questions::NewQuestion;
use crate::services::exam_session::SessionError;
use crate::services::scoring::question_max;
use crate::services::stores::{
    check_generated, PaperDraft, PaperStore, SessionMutation, SessionRecord, SessionStore,
    StoreError,
};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaperStore for PgStore {
    async fn find_paper(
        &self,
        contest_id: &str,
        code: &str,
    ) -> Result<Option<ExamPaper>, StoreError> {
        Ok(repositories::papers::find_by_code(&self.pool, contest_id, code).await?)
    }

    async fn list_papers(&self, contest_id: &str) -> Result<Vec<ExamPaper>, StoreError> {
        Ok(repositories::papers::list_by_contest(&self.pool, contest_id).await?)
    }

    async fn list_questions(&self, paper_id: &str) -> Result<Vec<ExamQuestion>, StoreError> {
        Ok(repositories::questions::list_by_paper(&self.pool, paper_id).await?)
    }

    async fn replace_paper(&self, draft: PaperDraft) -> Result<ExamPaper, StoreError> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        let paper = repositories::papers::upsert(
            &mut *tx,
            repositories::papers::UpsertPaper {
                id: &Uuid::new_v4().to_string(),
                contest_id: &draft.contest_id,
                code: &draft.code,
                subject: draft.subject,
                part1_count: draft.counts.part1 as i32,
                part2_count: draft.counts.part2 as i32,
                part3_count: draft.counts.part3 as i32,
                answer_key: &draft.keys,
                source_document: draft.source_document.as_ref(),
                now,
            },
        )
        .await?;

        let removed = repositories::questions::delete_by_paper(&mut *tx, &paper.id).await?;

        let questions: Vec<NewQuestion> = draft
            .keys
            .iter_keys()
            .map(|(part, number, answer)| NewQuestion {
                id: Uuid::new_v4().to_string(),
                part,
                number: number as i32,
                answer,
                max_points_centi: question_max(part, draft.subject).centi() as i32,
            })
            .collect();
        check_generated(&draft.counts, questions.iter().map(|question| question.part))?;
        let inserted =
            repositories::questions::insert_many(&mut *tx, &paper.id, &questions, now).await?;
        if inserted != questions.len() as u64 {
            return Err(StoreError::Inconsistent(format!(
                "inserted {inserted} of {} questions",
                questions.len()
            )));
        }

        tx.commit().await?;

        tracing::debug!(
            paper_id = %paper.id,
            revision = paper.revision,
            removed,
            inserted,
            "paper questions regenerated"
        );

        Ok(paper)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_if_absent(
        &self,
        record: SessionRecord,
    ) -> Result<(SessionRecord, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        let created = repositories::sessions::insert_if_absent(&mut *tx, &record.session).await?;
        if created {
            repositories::answer_sheets::create(&mut *tx, &record.sheet).await?;
            tx.commit().await?;
            return Ok((record, true));
        }
        tx.commit().await?;

        let existing = self
            .find_for_candidate(&record.session.contest_id, &record.session.candidate_id)
            .await?
            .ok_or_else(|| {
                StoreError::Inconsistent(format!(
                    "session for candidate {} vanished after conflict",
                    record.session.candidate_id
                ))
            })?;
        Ok((existing, false))
    }

    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let Some(session) = repositories::sessions::find_by_id(&self.pool, session_id).await?
        else {
            return Ok(None);
        };
        let sheet = repositories::answer_sheets::find_by_session(&self.pool, &session.id)
            .await?
            .ok_or_else(|| missing_sheet(&session.id))?;
        Ok(Some(SessionRecord { session, sheet }))
    }

    async fn find_for_candidate(
        &self,
        contest_id: &str,
        candidate_id: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let Some(session) =
            repositories::sessions::find_for_candidate(&self.pool, contest_id, candidate_id)
                .await?
        else {
            return Ok(None);
        };
        let sheet = repositories::answer_sheets::find_by_session(&self.pool, &session.id)
            .await?
            .ok_or_else(|| missing_sheet(&session.id))?;
        Ok(Some(SessionRecord { session, sheet }))
    }

    async fn list_for_contest(&self, contest_id: &str) -> Result<Vec<SessionRecord>, StoreError> {
        let sessions = repositories::sessions::list_by_contest(&self.pool, contest_id).await?;
        let ids: Vec<String> = sessions.iter().map(|session| session.id.clone()).collect();
        let mut sheets: HashMap<String, _> =
            repositories::answer_sheets::list_by_sessions(&self.pool, &ids)
                .await?
                .into_iter()
                .map(|sheet| (sheet.session_id.clone(), sheet))
                .collect();

        sessions
            .into_iter()
            .map(|session| {
                let sheet = sheets.remove(&session.id).ok_or_else(|| missing_sheet(&session.id))?;
                Ok(SessionRecord { session, sheet })
            })
            .collect()
    }

    async fn update(
        &self,
        session_id: &str,
        mutation: SessionMutation<'_>,
    ) -> Result<SessionRecord, SessionError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let session = repositories::sessions::find_by_id_for_update(&mut *tx, session_id)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let sheet = repositories::answer_sheets::find_by_session(&mut *tx, session_id)
            .await
            .map_err(StoreError::from)?
            .ok_or_else(|| missing_sheet(session_id))?;

        let original = SessionRecord { session, sheet };
        let mut record = original.clone();
        mutation(&mut record)?;

        if record.session != original.session {
            repositories::sessions::update_state(&mut *tx, &record.session)
                .await
                .map_err(StoreError::from)?;
        }
        if record.sheet != original.sheet {
            repositories::answer_sheets::update(&mut *tx, &record.sheet)
                .await
                .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        Ok(record)
    }
}

fn missing_sheet(session_id: &str) -> StoreError {
    StoreError::Inconsistent(format!("session {session_id} has no answer sheet"))
}
