use sqlx::PgPool;

use crate::db::models::AnswerSheet;

pub(crate) const COLUMNS: &str =
    "session_id, answers, saved_at, finalized, final_report, updated_at";

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    sheet: &AnswerSheet,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answer_sheets (session_id, answers, saved_at, finalized, final_report, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&sheet.session_id)
    .bind(&sheet.answers)
    .bind(sheet.saved_at)
    .bind(sheet.finalized)
    .bind(&sheet.final_report)
    .bind(sheet.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_session(
    executor: impl sqlx::PgExecutor<'_>,
    session_id: &str,
) -> Result<Option<AnswerSheet>, sqlx::Error> {
    sqlx::query_as::<_, AnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM answer_sheets WHERE session_id = $1"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_sessions(
    pool: &PgPool,
    session_ids: &[String],
) -> Result<Vec<AnswerSheet>, sqlx::Error> {
    if session_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, AnswerSheet>(&format!(
        "SELECT {COLUMNS} FROM answer_sheets WHERE session_id = ANY($1)"
    ))
    .bind(session_ids)
    .fetch_all(pool)
    .await
}

pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    sheet: &AnswerSheet,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE answer_sheets
         SET answers = $2, saved_at = $3, finalized = $4, final_report = $5, updated_at = $6
         WHERE session_id = $1",
    )
    .bind(&sheet.session_id)
    .bind(&sheet.answers)
    .bind(sheet.saved_at)
    .bind(sheet.finalized)
    .bind(&sheet.final_report)
    .bind(sheet.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}
