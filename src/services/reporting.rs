//! Read-side rollups over assignments and submissions.

use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::MonthWindow;
use crate::db::models::User;
use crate::repositories;
use crate::repositories::reports::{ScoreTotals, StudentMonthCounts};
use crate::schemas::report::{DashboardResponse, MonthlyReportResponse, OverviewResponse};

pub(crate) async fn dashboard(
    pool: &PgPool,
    user: &User,
    now: PrimitiveDateTime,
) -> Result<DashboardResponse, sqlx::Error> {
    let counts =
        repositories::reports::dashboard_counts(pool, &user.id, MonthWindow::containing(now), now)
            .await?;

    Ok(DashboardResponse {
        assigned_active: counts.assigned_active,
        assigned_expired: counts.assigned_expired,
        practice_taken_this_month: counts.practice_taken_this_month,
        assigned_taken_this_month: counts.assigned_taken_this_month,
    })
}

pub(crate) async fn overview(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<OverviewResponse, sqlx::Error> {
    let users = repositories::users::count_all(pool).await?;
    let tests = repositories::catalog::count_active(pool).await?;
    let active_assignments = repositories::assignments::count_open(pool).await?;
    let submissions_this_month =
        repositories::reports::count_submitted_between(pool, MonthWindow::containing(now)).await?;

    Ok(OverviewResponse { users, tests, active_assignments, submissions_this_month })
}

/// The student's report for the calendar month containing `now`.
pub(crate) async fn monthly_report(
    pool: &PgPool,
    user: &User,
    now: PrimitiveDateTime,
) -> Result<MonthlyReportResponse, sqlx::Error> {
    let window = MonthWindow::containing(now);
    let counts = repositories::reports::student_month_counts(pool, &user.id, window).await?;
    let scores = repositories::reports::student_month_scores(pool, &user.id, window).await?;

    Ok(build_report(window, counts, scores))
}

fn build_report(
    window: MonthWindow,
    counts: StudentMonthCounts,
    scores: ScoreTotals,
) -> MonthlyReportResponse {
    MonthlyReportResponse {
        month_name: window.display_name(),
        month: window.key(),
        assigned_total: counts.assigned_total,
        assigned_completed: counts.assigned_completed,
        submissions: scores.submissions,
        avg_score: scores.avg_score.map(|avg| avg.round() as i64).unwrap_or(0),
        practice_taken: counts.practice_taken,
    }
}

/// Recomputes the stored per-user rows for the month containing `now`.
pub(crate) async fn run_monthly_rollup(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let window = MonthWindow::containing(now);
    let rows = repositories::reports::upsert_month(pool, window, now).await?;
    tracing::info!(month = %window.key(), rows, "Monthly report rollup finished");
    Ok(rows)
}
