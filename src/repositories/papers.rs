use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::ExamPaper;
use crate::db::types::Subject;
use crate::schemas::answers::AnswerKeySet;
use crate::schemas::paper::SourceDocument;

pub(crate) const COLUMNS: &str = "\
    id, contest_id, code, subject, part1_count, part2_count, part3_count, \
    answer_key, source_document, revision, created_at, updated_at";

pub(crate) struct UpsertPaper<'a> {
    pub(crate) id: &'a str,
    pub(crate) contest_id: &'a str,
    pub(crate) code: &'a str,
    pub(crate) subject: Subject,
    pub(crate) part1_count: i32,
    pub(crate) part2_count: i32,
    pub(crate) part3_count: i32,
    pub(crate) answer_key: &'a AnswerKeySet,
    pub(crate) source_document: Option<&'a SourceDocument>,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn find_by_code(
    executor: impl sqlx::PgExecutor<'_>,
    contest_id: &str,
    code: &str,
) -> Result<Option<ExamPaper>, sqlx::Error> {
    sqlx::query_as::<_, ExamPaper>(&format!(
        "SELECT {COLUMNS} FROM exam_papers WHERE contest_id = $1 AND code = $2"
    ))
    .bind(contest_id)
    .bind(code)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_by_contest(
    pool: &PgPool,
    contest_id: &str,
) -> Result<Vec<ExamPaper>, sqlx::Error> {
    sqlx::query_as::<_, ExamPaper>(&format!(
        "SELECT {COLUMNS} FROM exam_papers WHERE contest_id = $1 ORDER BY code"
    ))
    .bind(contest_id)
    .fetch_all(pool)
    .await
}

/// Inserts or overwrites the paper for `(contest_id, code)` and bumps its revision.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertPaper<'_>,
) -> Result<ExamPaper, sqlx::Error> {
    sqlx::query_as::<_, ExamPaper>(&format!(
        "INSERT INTO exam_papers (
            id, contest_id, code, subject, part1_count, part2_count, part3_count,
            answer_key, source_document, revision, created_at, updated_at
         )
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, $10, $10)
         ON CONFLICT (contest_id, code) DO UPDATE SET
            subject = EXCLUDED.subject,
            part1_count = EXCLUDED.part1_count,
            part2_count = EXCLUDED.part2_count,
            part3_count = EXCLUDED.part3_count,
            answer_key = EXCLUDED.answer_key,
            source_document = EXCLUDED.source_document,
            revision = exam_papers.revision + 1,
            updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.contest_id)
    .bind(params.code)
    .bind(params.subject)
    .bind(params.part1_count)
    .bind(params.part2_count)
    .bind(params.part3_count)
    .bind(Json(params.answer_key))
    .bind(params.source_document.map(Json))
    .bind(params.now)
    .fetch_one(executor)
    .await
}
