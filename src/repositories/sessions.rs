use sqlx::PgPool;

use crate::db::models::ExamSession;

pub(crate) const COLUMNS: &str = "\
    id, contest_id, candidate_id, paper_code, violation_count, lock_state, \
    submission_state, started_at, finalized_at, created_at, updated_at";

pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    session: &ExamSession,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_sessions (
            id, contest_id, candidate_id, paper_code, violation_count, lock_state,
            submission_state, started_at, finalized_at, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (contest_id, candidate_id) DO NOTHING",
    )
    .bind(&session.id)
    .bind(&session.contest_id)
    .bind(&session.candidate_id)
    .bind(&session.paper_code)
    .bind(session.violation_count)
    .bind(session.lock_state)
    .bind(session.submission_state)
    .bind(session.started_at)
    .bind(session.finalized_at)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!("SELECT {COLUMNS} FROM exam_sessions WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_by_id_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_for_candidate(
    executor: impl sqlx::PgExecutor<'_>,
    contest_id: &str,
    candidate_id: &str,
) -> Result<Option<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE contest_id = $1 AND candidate_id = $2"
    ))
    .bind(contest_id)
    .bind(candidate_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_contest(
    pool: &PgPool,
    contest_id: &str,
) -> Result<Vec<ExamSession>, sqlx::Error> {
    sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE contest_id = $1 ORDER BY created_at"
    ))
    .bind(contest_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update_state(
    executor: impl sqlx::PgExecutor<'_>,
    session: &ExamSession,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exam_sessions
         SET paper_code = $2, violation_count = $3, lock_state = $4, submission_state = $5,
             started_at = $6, finalized_at = $7, updated_at = $8
         WHERE id = $1",
    )
    .bind(&session.id)
    .bind(&session.paper_code)
    .bind(session.violation_count)
    .bind(session.lock_state)
    .bind(session.submission_state)
    .bind(session.started_at)
    .bind(session.finalized_at)
    .bind(session.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}
