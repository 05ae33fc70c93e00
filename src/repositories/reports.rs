use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::core::time::MonthWindow;
use crate::db::types::AssignmentStatus;

#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct DashboardCounts {
    pub(crate) assigned_active: i64,
    pub(crate) assigned_expired: i64,
    pub(crate) practice_taken_this_month: i64,
    pub(crate) assigned_taken_this_month: i64,
}

pub(crate) async fn dashboard_counts(
    pool: &PgPool,
    user_id: &str,
    window: MonthWindow,
    now: PrimitiveDateTime,
) -> Result<DashboardCounts, sqlx::Error> {
    sqlx::query_as::<_, DashboardCounts>(
        "SELECT
            COUNT(*) FILTER (
                WHERE assigned_by <> assigned_to AND status IN ($2, $3) AND expires_at > $4
            ) AS assigned_active,
            COUNT(*) FILTER (
                WHERE assigned_by <> assigned_to
                  AND (status = $5 OR (status IN ($2, $3) AND expires_at <= $4))
            ) AS assigned_expired,
            COUNT(*) FILTER (
                WHERE assigned_by = assigned_to AND status = $6
                  AND submitted_at >= $7 AND submitted_at < $8
            ) AS practice_taken_this_month,
            COUNT(*) FILTER (
                WHERE assigned_by <> assigned_to AND status = $6
                  AND submitted_at >= $7 AND submitted_at < $8
            ) AS assigned_taken_this_month
         FROM assignments
         WHERE assigned_to = $1",
    )
    .bind(user_id)
    .bind(AssignmentStatus::Assigned)
    .bind(AssignmentStatus::InProgress)
    .bind(now)
    .bind(AssignmentStatus::Expired)
    .bind(AssignmentStatus::Submitted)
    .bind(window.start)
    .bind(window.end)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct StudentMonthCounts {
    pub(crate) assigned_total: i64,
    pub(crate) assigned_completed: i64,
    pub(crate) practice_taken: i64,
}

pub(crate) async fn student_month_counts(
    pool: &PgPool,
    user_id: &str,
    window: MonthWindow,
) -> Result<StudentMonthCounts, sqlx::Error> {
    sqlx::query_as::<_, StudentMonthCounts>(
        "SELECT
            COUNT(*) FILTER (
                WHERE assigned_by <> assigned_to AND created_at >= $2 AND created_at < $3
            ) AS assigned_total,
            COUNT(*) FILTER (
                WHERE assigned_by <> assigned_to AND status = $4
                  AND submitted_at >= $2 AND submitted_at < $3
            ) AS assigned_completed,
            COUNT(*) FILTER (
                WHERE assigned_by = assigned_to AND status = $4
                  AND submitted_at >= $2 AND submitted_at < $3
            ) AS practice_taken
         FROM assignments
         WHERE assigned_to = $1",
    )
    .bind(user_id)
    .bind(window.start)
    .bind(window.end)
    .bind(AssignmentStatus::Submitted)
    .fetch_one(pool)
    .await
}

#[derive(Debug, Clone, Copy, FromRow)]
pub(crate) struct ScoreTotals {
    pub(crate) submissions: i64,
    pub(crate) avg_score: Option<f64>,
}

pub(crate) async fn student_month_scores(
    pool: &PgPool,
    user_id: &str,
    window: MonthWindow,
) -> Result<ScoreTotals, sqlx::Error> {
    sqlx::query_as::<_, ScoreTotals>(
        "SELECT COUNT(*) AS submissions, AVG(score) AS avg_score
         FROM submissions
         WHERE user_id = $1 AND submitted_at >= $2 AND submitted_at < $3",
    )
    .bind(user_id)
    .bind(window.start)
    .bind(window.end)
    .fetch_one(pool)
    .await
}

pub(crate) async fn count_submitted_between(
    pool: &PgPool,
    window: MonthWindow,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM submissions WHERE submitted_at >= $1 AND submitted_at < $2",
    )
    .bind(window.start)
    .bind(window.end)
    .fetch_one(pool)
    .await
}

/// Recomputes every user's row for `window` and upserts it. Returns rows written.
pub(crate) async fn upsert_month(
    pool: &PgPool,
    window: MonthWindow,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "WITH assigned AS (
            SELECT assigned_to AS user_id, COUNT(*) AS assigned_count
            FROM assignments
            WHERE created_at >= $1 AND created_at < $2
            GROUP BY assigned_to
        ), submitted AS (
            SELECT assigned_to AS user_id, COUNT(*) AS submitted_count
            FROM assignments
            WHERE status = $3 AND submitted_at >= $1 AND submitted_at < $2
            GROUP BY assigned_to
        ), scored AS (
            SELECT user_id,
                   COALESCE(SUM(score), 0) AS total_score,
                   COALESCE(SUM(max_score), 0) AS total_max_score,
                   COUNT(*) AS scored_count
            FROM submissions
            WHERE submitted_at >= $1 AND submitted_at < $2
            GROUP BY user_id
        ), active_users AS (
            SELECT user_id FROM assigned
            UNION SELECT user_id FROM submitted
            UNION SELECT user_id FROM scored
        )
        INSERT INTO monthly_reports (
            user_id, month, assigned_count, submitted_count,
            total_score, total_max_score, avg_score, updated_at
        )
        SELECT active_users.user_id,
               $4,
               COALESCE(assigned.assigned_count, 0),
               COALESCE(submitted.submitted_count, 0),
               COALESCE(scored.total_score, 0),
               COALESCE(scored.total_max_score, 0),
               CASE WHEN COALESCE(scored.scored_count, 0) > 0
                    THEN scored.total_score / scored.scored_count
                    ELSE 0 END,
               $5
        FROM active_users
        LEFT JOIN assigned USING (user_id)
        LEFT JOIN submitted USING (user_id)
        LEFT JOIN scored USING (user_id)
        ON CONFLICT (user_id, month) DO UPDATE SET
            assigned_count = EXCLUDED.assigned_count,
            submitted_count = EXCLUDED.submitted_count,
            total_score = EXCLUDED.total_score,
            total_max_score = EXCLUDED.total_max_score,
            avg_score = EXCLUDED.avg_score,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(window.start)
    .bind(window.end)
    .bind(AssignmentStatus::Submitted)
    .bind(window.key())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
