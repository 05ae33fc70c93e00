use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::repositories;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepOutcome {
    pub(crate) matched: u64,
    pub(crate) modified: u64,
}

/// Moves every open assignment past its deadline to `expired` in one statement.
///
/// The status filter in the update is the same guard the per-assignment check uses, so a
/// row that a racing submit already flipped to `submitted` is left untouched. Matched and
/// modified are the same count for a single filtered `UPDATE`.
pub(crate) async fn sweep(pool: &PgPool, now: PrimitiveDateTime) -> Result<SweepOutcome, sqlx::Error> {
    let modified = repositories::assignments::expire_overdue(pool, now).await?;
    if modified > 0 {
        metrics::counter!("assignments_expired_total", "source" => "sweep").increment(modified);
    }

    Ok(SweepOutcome { matched: modified, modified })
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::AssignmentStatus;
    use crate::test_support;

    #[tokio::test]
    async fn sweep_expires_only_overdue_open_assignments() {
        let ctx = test_support::setup_test_context().await;
        let pool = ctx.state.db();
        let now = primitive_now_utc();

        let admin = test_support::insert_admin(pool, "admin@example.com").await;
        let student = test_support::insert_student(pool, "student@example.com").await;
        let test = test_support::insert_fixture_test(pool, "test-1").await;

        let overdue = test_support::insert_assignment(
            pool,
            &test.id,
            &student.id,
            &admin.id,
            AssignmentStatus::Assigned,
            now - Duration::minutes(5),
        )
        .await;
        let overdue_started = test_support::insert_assignment(
            pool,
            &test.id,
            &student.id,
            &admin.id,
            AssignmentStatus::InProgress,
            now - Duration::seconds(1),
        )
        .await;
        let open = test_support::insert_assignment(
            pool,
            &test.id,
            &student.id,
            &admin.id,
            AssignmentStatus::Assigned,
            now + Duration::hours(1),
        )
        .await;
        let submitted = test_support::insert_assignment(
            pool,
            &test.id,
            &student.id,
            &admin.id,
            AssignmentStatus::Submitted,
            now - Duration::hours(1),
        )
        .await;

        let outcome = sweep(pool, now).await.expect("sweep");
        assert_eq!(outcome, SweepOutcome { matched: 2, modified: 2 });

        assert_eq!(test_support::assignment_status(pool, &overdue.id).await, AssignmentStatus::Expired);
        assert_eq!(
            test_support::assignment_status(pool, &overdue_started.id).await,
            AssignmentStatus::Expired
        );
        assert_eq!(test_support::assignment_status(pool, &open.id).await, AssignmentStatus::Assigned);
        assert_eq!(
            test_support::assignment_status(pool, &submitted.id).await,
            AssignmentStatus::Submitted
        );

        let again = sweep(pool, now).await.expect("second sweep");
        assert_eq!(again, SweepOutcome { matched: 0, modified: 0 });
    }
}
