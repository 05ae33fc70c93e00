use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Assignment;
use crate::db::types::AssignmentStatus;

pub(crate) const COLUMNS: &str = "\
    id, test_id, assigned_to, assigned_by, expires_at, status, attempt_limit, \
    override_duration_minutes, override_question_count, started_at, submitted_at, \
    created_at, updated_at";

pub(crate) struct CreateAssignment<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) assigned_to: &'a str,
    pub(crate) assigned_by: &'a str,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) status: AssignmentStatus,
    pub(crate) attempt_limit: i32,
    pub(crate) override_duration_minutes: Option<i32>,
    pub(crate) override_question_count: Option<i32>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAssignment<'_>,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "INSERT INTO assignments (
            id, test_id, assigned_to, assigned_by, expires_at, status, attempt_limit,
            override_duration_minutes, override_question_count, started_at,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.test_id)
    .bind(params.assigned_to)
    .bind(params.assigned_by)
    .bind(params.expires_at)
    .bind(params.status)
    .bind(params.attempt_limit)
    .bind(params.override_duration_minutes)
    .bind(params.override_question_count)
    .bind(params.started_at)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn find_for_user(
    pool: &PgPool,
    id: &str,
    user_id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments WHERE id = $1 AND assigned_to = $2"
    ))
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_many_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Assignment>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// Admin-assigned work for one student, newest first. Practice sessions are excluded.
pub(crate) async fn list_assigned_to(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {COLUMNS} FROM assignments
         WHERE assigned_to = $1 AND assigned_by <> assigned_to
         ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct AssignmentFilter<'a> {
    pub(crate) status: Option<AssignmentStatus>,
    pub(crate) user_id: Option<&'a str>,
    pub(crate) test_id: Option<&'a str>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

pub(crate) async fn list_filtered(
    pool: &PgPool,
    filter: AssignmentFilter<'_>,
) -> Result<Vec<Assignment>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM assignments WHERE TRUE"));

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND assigned_to = ");
        builder.push_bind(user_id);
    }
    if let Some(test_id) = filter.test_id {
        builder.push(" AND test_id = ");
        builder.push_bind(test_id);
    }

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(filter.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.clamp(1, 1000));

    builder.build_query_as::<Assignment>().fetch_all(pool).await
}

/// `assigned|in_progress -> expired` once the deadline has passed. `None` when the row
/// was not open or not yet due.
pub(crate) async fn expire_if_open(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments
         SET status = $1, updated_at = $2
         WHERE id = $3 AND status IN ($4, $5) AND expires_at <= $2
         RETURNING {COLUMNS}"
    ))
    .bind(AssignmentStatus::Expired)
    .bind(now)
    .bind(id)
    .bind(AssignmentStatus::Assigned)
    .bind(AssignmentStatus::InProgress)
    .fetch_optional(executor)
    .await
}

/// `assigned -> in_progress` while the deadline is still ahead.
pub(crate) async fn mark_started(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments
         SET status = $1, started_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4 AND expires_at > $2
         RETURNING {COLUMNS}"
    ))
    .bind(AssignmentStatus::InProgress)
    .bind(now)
    .bind(id)
    .bind(AssignmentStatus::Assigned)
    .fetch_optional(executor)
    .await
}

/// `assigned|in_progress -> submitted` while the deadline is still ahead. A never-started
/// assignment is started and submitted at the same instant.
pub(crate) async fn mark_submitted(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(&format!(
        "UPDATE assignments
         SET status = $1,
             submitted_at = $2,
             started_at = COALESCE(started_at, $2),
             updated_at = $2
         WHERE id = $3 AND status IN ($4, $5) AND expires_at > $2
         RETURNING {COLUMNS}"
    ))
    .bind(AssignmentStatus::Submitted)
    .bind(now)
    .bind(id)
    .bind(AssignmentStatus::Assigned)
    .bind(AssignmentStatus::InProgress)
    .fetch_optional(executor)
    .await
}

/// Batch form of [`expire_if_open`]. Returns the number of rows moved to `expired`.
pub(crate) async fn expire_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE assignments
         SET status = $1, updated_at = $2
         WHERE status IN ($3, $4) AND expires_at <= $2",
    )
    .bind(AssignmentStatus::Expired)
    .bind(now)
    .bind(AssignmentStatus::Assigned)
    .bind(AssignmentStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn count_open(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM assignments WHERE status IN ($1, $2)")
        .bind(AssignmentStatus::Assigned)
        .bind(AssignmentStatus::InProgress)
        .fetch_one(pool)
        .await
}
