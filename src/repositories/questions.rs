use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use crate::db::models::ExamQuestion;
use crate::db::types::QuestionPart;
use crate::schemas::answers::AnswerKey;

pub(crate) const COLUMNS: &str =
    "id, paper_id, part, number, answer, max_points_centi, created_at";

pub(crate) struct NewQuestion {
    pub(crate) id: String,
    pub(crate) part: QuestionPart,
    pub(crate) number: i32,
    pub(crate) answer: AnswerKey,
    pub(crate) max_points_centi: i32,
}

pub(crate) async fn list_by_paper(
    executor: impl sqlx::PgExecutor<'_>,
    paper_id: &str,
) -> Result<Vec<ExamQuestion>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestion>(&format!(
        "SELECT {COLUMNS} FROM exam_questions WHERE paper_id = $1 ORDER BY part, number"
    ))
    .bind(paper_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn delete_by_paper(
    executor: impl sqlx::PgExecutor<'_>,
    paper_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exam_questions WHERE paper_id = $1")
        .bind(paper_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn insert_many(
    executor: impl sqlx::PgExecutor<'_>,
    paper_id: &str,
    questions: &[NewQuestion],
    created_at: time::PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if questions.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO exam_questions (id, paper_id, part, number, answer, max_points_centi, created_at) ",
    );
    builder.push_values(questions, |mut row, question| {
        row.push_bind(&question.id)
            .push_bind(paper_id)
            .push_bind(question.part)
            .push_bind(question.number)
            .push_bind(Json(&question.answer))
            .push_bind(question.max_points_centi)
            .push_bind(created_at);
    });

    let result = builder.build().execute(executor).await?;
    Ok(result.rows_affected())
}
