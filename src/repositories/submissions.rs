use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::schemas::submission::{CodingResult, QuizAnswer, SubmitRequest};

pub(crate) const COLUMNS: &str = "\
    id, assignment_id, user_id, started_at, submitted_at, quiz_answers, coding, \
    pending_answers, score, max_score, quiz_score, coding_score, quiz_correct, quiz_total, \
    coding_passed_hidden, coding_total_hidden, email_student_sent, email_admin_sent, \
    email_last_error, created_at, updated_at";

/// Lazily creates the submission paired with an assignment. An existing row is left as is.
pub(crate) async fn create_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    assignment_id: &str,
    user_id: &str,
    started_at: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO submissions (id, assignment_id, user_id, started_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4, $4)
         ON CONFLICT (assignment_id) DO NOTHING",
    )
    .bind(id)
    .bind(assignment_id)
    .bind(user_id)
    .bind(started_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stores the answers of an accepted submit alongside the status flip. A row that already
/// carries a score is left untouched.
pub(crate) async fn stage_answers(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    assignment_id: &str,
    user_id: &str,
    started_at: PrimitiveDateTime,
    answers: &SubmitRequest,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submissions (
            id, assignment_id, user_id, started_at, pending_answers, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (assignment_id) DO UPDATE SET
            pending_answers = EXCLUDED.pending_answers,
            updated_at = EXCLUDED.updated_at
        WHERE submissions.score IS NULL",
    )
    .bind(id)
    .bind(assignment_id)
    .bind(user_id)
    .bind(started_at)
    .bind(Json(answers))
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

pub(crate) struct FinalizeSubmission<'a> {
    pub(crate) assignment_id: &'a str,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) quiz_answers: &'a [QuizAnswer],
    pub(crate) coding: &'a [CodingResult],
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) quiz_score: f64,
    pub(crate) coding_score: f64,
    pub(crate) quiz_correct: i32,
    pub(crate) quiz_total: i32,
    pub(crate) coding_passed_hidden: i32,
    pub(crate) coding_total_hidden: i32,
}

/// Writes the graded result of a staged submission. Only the first writer succeeds;
/// `None` means the row was already graded. Email flags are left as they are.
pub(crate) async fn finalize(
    executor: impl sqlx::PgExecutor<'_>,
    params: FinalizeSubmission<'_>,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions SET
            started_at = COALESCE(started_at, $2),
            submitted_at = $3,
            quiz_answers = $4,
            coding = $5,
            pending_answers = NULL,
            score = $6,
            max_score = $7,
            quiz_score = $8,
            coding_score = $9,
            quiz_correct = $10,
            quiz_total = $11,
            coding_passed_hidden = $12,
            coding_total_hidden = $13,
            updated_at = $3
        WHERE assignment_id = $1 AND score IS NULL
        RETURNING {COLUMNS}"
    ))
    .bind(params.assignment_id)
    .bind(params.started_at)
    .bind(params.submitted_at)
    .bind(Json(params.quiz_answers))
    .bind(Json(params.coding))
    .bind(params.score)
    .bind(params.max_score)
    .bind(params.quiz_score)
    .bind(params.coding_score)
    .bind(params.quiz_correct)
    .bind(params.quiz_total)
    .bind(params.coding_passed_hidden)
    .bind(params.coding_total_hidden)
    .fetch_optional(executor)
    .await
}

/// Accepted submissions that still have no score and were last touched before
/// `stale_before`, oldest first.
pub(crate) async fn list_ungraded(
    pool: &PgPool,
    stale_before: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE score IS NULL AND pending_answers IS NOT NULL AND updated_at < $1
         ORDER BY updated_at
         LIMIT $2"
    ))
    .bind(stale_before)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_assignment(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE assignment_id = $1"
    ))
    .bind(assignment_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_submitted_by_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE user_id = $1 AND submitted_at IS NOT NULL
         ORDER BY submitted_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_submitted(
    pool: &PgPool,
    skip: i64,
    limit: i64,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions
         WHERE submitted_at IS NOT NULL
         ORDER BY submitted_at DESC
         OFFSET $1 LIMIT $2"
    ))
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

/// Sent flags only ever move from false to true. `last_error` is replaced when given.
pub(crate) async fn record_email_status(
    pool: &PgPool,
    id: &str,
    student_sent: bool,
    admin_sent: bool,
    last_error: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET email_student_sent = email_student_sent OR $1,
             email_admin_sent = email_admin_sent OR $2,
             email_last_error = COALESCE($3, email_last_error),
             updated_at = $4
         WHERE id = $5",
    )
    .bind(student_sent)
    .bind(admin_sent)
    .bind(last_error)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}
