//! Assignment state machine: `assigned -> in_progress -> submitted`, with `expired` reachable
//! from either open state once the deadline passes.
//!
//! The persisted `status` column is the only coordination point between requests, the
//! expiry sweep and other instances. Every transition is a conditional `UPDATE` that
//! re-checks the current status, so a lost race shows up as "no row updated" and is
//! resolved by re-reading the row.

use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::{Assignment, Submission, Test, User};
use crate::db::types::AssignmentStatus;
use crate::repositories;
use crate::repositories::assignments::CreateAssignment;
use crate::repositories::submissions::FinalizeSubmission;
use crate::schemas::assignment::{
    BulkAssignRequest, RunCustomRequest, RunCustomResponse, RunRequest,
};
use crate::schemas::submission::{SampleResult, SubmitRequest};
use crate::services::catalog::{self, CatalogError};
use crate::services::{notifications, scoring};

#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Assignment expired")]
    Expired,
    #[error("Assignment already submitted")]
    AlreadySubmitted,
    #[error("Assignment is not in progress")]
    NotInProgress,
    #[error("{0}")]
    Invalid(String),
    #[error("Too many code runs, try again in a minute")]
    RateLimited,
    #[error("Assignment was modified concurrently")]
    StateChanged,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CatalogError> for LifecycleError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound => LifecycleError::NotFound("Test not found or inactive"),
            CatalogError::Invalid(message) => LifecycleError::Invalid(message),
            CatalogError::Database(err) => LifecycleError::Database(err),
        }
    }
}

/// Why an operation on an assignment in `status` cannot proceed.
fn rejection(status: AssignmentStatus) -> LifecycleError {
    match status {
        AssignmentStatus::Submitted => LifecycleError::AlreadySubmitted,
        AssignmentStatus::Expired => LifecycleError::Expired,
        AssignmentStatus::Assigned => LifecycleError::NotInProgress,
        AssignmentStatus::InProgress => LifecycleError::StateChanged,
    }
}

/// Lazily expires an open assignment whose deadline has passed. Safe to race with the
/// sweep and with submit: whichever conditional update lands first wins.
pub(crate) async fn check_expiry(
    pool: &PgPool,
    assignment: Assignment,
    now: PrimitiveDateTime,
) -> Result<Assignment, sqlx::Error> {
    if assignment.status.is_terminal() || !assignment.is_past_deadline(now) {
        return Ok(assignment);
    }

    if let Some(expired) = repositories::assignments::expire_if_open(pool, &assignment.id, now).await?
    {
        metrics::counter!("assignments_expired_total", "source" => "lazy").increment(1);
        tracing::info!(
            assignment_id = %expired.id,
            user_id = %expired.assigned_to,
            "Assignment expired"
        );
        return Ok(expired);
    }

    // Someone else moved it first; report what they wrote.
    Ok(repositories::assignments::find_by_id(pool, &assignment.id).await?.unwrap_or(assignment))
}

async fn load_owned(
    pool: &PgPool,
    assignment_id: &str,
    user_id: &str,
    now: PrimitiveDateTime,
) -> Result<Assignment, LifecycleError> {
    let assignment = repositories::assignments::find_for_user(pool, assignment_id, user_id)
        .await?
        .ok_or(LifecycleError::NotFound("Assignment not found"))?;

    Ok(check_expiry(pool, assignment, now).await?)
}

async fn reload(
    pool: &PgPool,
    assignment_id: &str,
    now: PrimitiveDateTime,
) -> Result<Assignment, LifecycleError> {
    let assignment = repositories::assignments::find_by_id(pool, assignment_id)
        .await?
        .ok_or(LifecycleError::NotFound("Assignment not found"))?;

    Ok(check_expiry(pool, assignment, now).await?)
}

/// The caller's admin-assigned work, newest first, each lazily expiry-checked.
pub(crate) async fn list_for_student(
    state: &AppState,
    user: &User,
) -> Result<Vec<Assignment>, LifecycleError> {
    let now = primitive_now_utc();
    let assignments = repositories::assignments::list_assigned_to(state.db(), &user.id).await?;

    let mut checked = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        checked.push(check_expiry(state.db(), assignment, now).await?);
    }

    Ok(checked)
}

/// Assignment plus its active test, for rendering the attempt page.
pub(crate) async fn detail(
    state: &AppState,
    assignment_id: &str,
    user: &User,
) -> Result<(Assignment, Test), LifecycleError> {
    let now = primitive_now_utc();
    let assignment = load_owned(state.db(), assignment_id, &user.id, now).await?;
    if assignment.status == AssignmentStatus::Expired {
        return Err(LifecycleError::Expired);
    }

    let test = catalog::grading_view(state.db(), &assignment.test_id).await?;
    Ok((assignment, test))
}

pub(crate) async fn start(
    state: &AppState,
    assignment_id: &str,
    user: &User,
) -> Result<Assignment, LifecycleError> {
    let db = state.db();
    let now = primitive_now_utc();
    let assignment = load_owned(db, assignment_id, &user.id, now).await?;

    match assignment.status {
        AssignmentStatus::Submitted | AssignmentStatus::Expired => {
            return Err(rejection(assignment.status));
        }
        AssignmentStatus::InProgress => {
            ensure_submission(db, &assignment, now).await?;
            return Ok(assignment);
        }
        AssignmentStatus::Assigned => {}
    }

    catalog::grading_view(db, &assignment.test_id).await?;

    let mut tx = db.begin().await?;
    let started = repositories::assignments::mark_started(&mut *tx, &assignment.id, now).await?;
    let Some(started) = started else {
        tx.rollback().await?;
        let current = reload(db, &assignment.id, now).await?;
        if current.status == AssignmentStatus::InProgress {
            ensure_submission(db, &current, now).await?;
            return Ok(current);
        }
        return Err(rejection(current.status));
    };
    repositories::submissions::create_if_absent(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &started.id,
        &started.assigned_to,
        now,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(assignment_id = %started.id, user_id = %user.id, "Assignment started");
    Ok(started)
}

async fn ensure_submission(
    pool: &PgPool,
    assignment: &Assignment,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    repositories::submissions::create_if_absent(
        pool,
        &Uuid::new_v4().to_string(),
        &assignment.id,
        &assignment.assigned_to,
        assignment.started_at.unwrap_or(now),
    )
    .await?;
    Ok(())
}

/// Exactly-once submission. The status flip and the accepted answers commit together
/// before any scoring work, so a concurrent submit or sweep observes the terminal state
/// and an interrupted grading run can be finished later by [`recover_ungraded`].
pub(crate) async fn submit(
    state: &AppState,
    assignment_id: &str,
    user: &User,
    payload: &SubmitRequest,
) -> Result<Submission, LifecycleError> {
    let db = state.db();
    let now = primitive_now_utc();
    let assignment = load_owned(db, assignment_id, &user.id, now).await?;
    if !assignment.status.can_transition_to(AssignmentStatus::Submitted) {
        return Err(rejection(assignment.status));
    }

    let test = catalog::grading_view(db, &assignment.test_id).await?;

    let mut tx = db.begin().await?;
    let Some(submitted) =
        repositories::assignments::mark_submitted(&mut *tx, &assignment.id, now).await?
    else {
        tx.rollback().await?;
        let current = reload(db, &assignment.id, now).await?;
        tracing::info!(
            assignment_id = %assignment.id,
            status = current.status.as_str(),
            "Submit lost the status race"
        );
        return Err(rejection(current.status));
    };
    let submitted_at = submitted.submitted_at.unwrap_or(now);
    repositories::submissions::stage_answers(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &submitted.id,
        &submitted.assigned_to,
        submitted.started_at.unwrap_or(submitted_at),
        payload,
        now,
    )
    .await?;
    tx.commit().await?;

    metrics::counter!("assignments_submitted_total").increment(1);
    tracing::info!(assignment_id = %submitted.id, user_id = %user.id, "Assignment submitted");

    match grade(state, &submitted, &test, payload).await {
        Ok(Some(submission)) => Ok(submission),
        Ok(None) => repositories::submissions::find_by_assignment(db, &submitted.id)
            .await?
            .ok_or(LifecycleError::NotFound("Submission not found")),
        Err(err) => {
            tracing::error!(
                assignment_id = %submitted.id,
                error = %err,
                "Failed to persist graded submission; left for recovery"
            );
            Err(LifecycleError::Database(err))
        }
    }
}

/// Scores `answers` and writes the result if nobody has yet. `None` when another grader
/// got there first; result emails go out only from the write that landed.
async fn grade(
    state: &AppState,
    assignment: &Assignment,
    test: &Test,
    answers: &SubmitRequest,
) -> Result<Option<Submission>, sqlx::Error> {
    let db = state.db();
    let outcome =
        scoring::score_submission(state.executor(), test, &answers.quiz_answers, &answers.coding)
            .await;

    let submitted_at = assignment.submitted_at.unwrap_or_else(primitive_now_utc);
    let finalized = repositories::submissions::finalize(
        db,
        FinalizeSubmission {
            assignment_id: &assignment.id,
            started_at: assignment.started_at.unwrap_or(submitted_at),
            submitted_at,
            quiz_answers: &answers.quiz_answers,
            coding: &outcome.coding.results,
            score: outcome.score,
            max_score: outcome.max_score,
            quiz_score: outcome.quiz.score,
            coding_score: outcome.coding.score,
            quiz_correct: to_i32(outcome.breakdown.quiz_correct),
            quiz_total: to_i32(outcome.breakdown.quiz_total),
            coding_passed_hidden: to_i32(outcome.breakdown.coding_passed_hidden),
            coding_total_hidden: to_i32(outcome.breakdown.coding_total_hidden),
        },
    )
    .await?;

    let Some(submission) = finalized else {
        tracing::info!(assignment_id = %assignment.id, "Submission was graded elsewhere");
        return Ok(None);
    };

    tracing::info!(
        assignment_id = %assignment.id,
        submission_id = %submission.id,
        score = outcome.score,
        max_score = outcome.max_score,
        "Submission graded"
    );

    notifications::dispatch_result_emails(state.clone(), submission.id.clone());
    Ok(Some(submission))
}

const RECOVERY_BATCH: i64 = 50;

/// Grades accepted submissions whose own request never wrote a score, e.g. after a crash
/// or a failed write. Only rows untouched since `stale_before` are picked up. Returns the
/// number graded by this call.
pub(crate) async fn recover_ungraded(
    state: &AppState,
    stale_before: PrimitiveDateTime,
) -> Result<usize, sqlx::Error> {
    let db = state.db();
    let pending = repositories::submissions::list_ungraded(db, stale_before, RECOVERY_BATCH).await?;

    let mut graded = 0;
    for submission in pending {
        let Some(answers) = submission.pending_answers.as_ref().map(|answers| &answers.0) else {
            continue;
        };
        let Some(assignment) =
            repositories::assignments::find_by_id(db, &submission.assignment_id).await?
        else {
            continue;
        };
        // Inactive tests still grade work accepted before deactivation.
        let Some(test) = repositories::catalog::find_by_id(db, &assignment.test_id).await? else {
            tracing::warn!(assignment_id = %assignment.id, "Ungraded submission has no test");
            continue;
        };

        match grade(state, &assignment, &test, answers).await {
            Ok(Some(_)) => {
                graded += 1;
                metrics::counter!("submissions_recovered_total").increment(1);
            }
            Ok(None) => {}
            Err(err) => tracing::error!(
                assignment_id = %assignment.id,
                error = %err,
                "Failed to recover ungraded submission"
            ),
        }
    }

    if graded > 0 {
        tracing::info!(graded, "Recovered ungraded submissions");
    }
    Ok(graded)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

async fn require_in_progress(
    state: &AppState,
    assignment_id: &str,
    user: &User,
) -> Result<Assignment, LifecycleError> {
    let assignment = load_owned(state.db(), assignment_id, &user.id, primitive_now_utc()).await?;
    match assignment.status {
        AssignmentStatus::InProgress => Ok(assignment),
        status => Err(rejection(status)),
    }
}

async fn enforce_run_limit(state: &AppState, assignment_id: &str) -> Result<(), LifecycleError> {
    let per_minute = state.settings().assignment().run_rate_limit_per_minute;
    match state.redis().allow_code_run(assignment_id, per_minute).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::info!(assignment_id, "Code run rate limit reached");
            Err(LifecycleError::RateLimited)
        }
        Err(err) => {
            tracing::warn!(assignment_id, error = %err, "Run rate limiter unavailable; allowing run");
            Ok(())
        }
    }
}

/// Ungraded try-run against sample cases. Never touches the submission.
pub(crate) async fn run_sample_code(
    state: &AppState,
    assignment_id: &str,
    user: &User,
    request: &RunRequest,
) -> Result<Vec<SampleResult>, LifecycleError> {
    let assignment = require_in_progress(state, assignment_id, user).await?;
    enforce_run_limit(state, &assignment.id).await?;

    let test = catalog::grading_view(state.db(), &assignment.test_id).await?;
    let problem = catalog::find_problem(&test, &request.problem_id)
        .ok_or(LifecycleError::NotFound("Problem not found"))?;

    Ok(state.executor().run_samples(problem, &request.language, &request.source_code).await)
}

pub(crate) async fn run_custom_code(
    state: &AppState,
    assignment_id: &str,
    user: &User,
    request: &RunCustomRequest,
) -> Result<RunCustomResponse, LifecycleError> {
    let assignment = require_in_progress(state, assignment_id, user).await?;
    enforce_run_limit(state, &assignment.id).await?;

    Ok(state
        .executor()
        .run_custom(&request.language, &request.source_code, &request.custom_input)
        .await)
}

/// Self-assigned practice attempt, started immediately.
pub(crate) async fn start_practice(
    state: &AppState,
    user: &User,
    test_id: &str,
) -> Result<Assignment, LifecycleError> {
    let db = state.db();
    let test = match catalog::grading_view(db, test_id).await {
        Ok(test) if test.metadata.is_practice => test,
        Ok(_) | Err(CatalogError::NotFound) => {
            return Err(LifecycleError::NotFound("Practice test not found"));
        }
        Err(err) => return Err(err.into()),
    };

    let settings = state.settings().assignment();
    let now = primitive_now_utc();
    let expiry_hours = i64::try_from(settings.practice_expiry_hours).unwrap_or(i64::MAX);
    let expires_at = now.saturating_add(time::Duration::hours(expiry_hours));

    let mut tx = db.begin().await?;
    let assignment = repositories::assignments::create(
        &mut *tx,
        CreateAssignment {
            id: &Uuid::new_v4().to_string(),
            test_id: &test.id,
            assigned_to: &user.id,
            assigned_by: &user.id,
            expires_at,
            status: AssignmentStatus::InProgress,
            attempt_limit: settings.practice_attempt_limit,
            override_duration_minutes: Some(test.metadata.duration_minutes),
            override_question_count: None,
            started_at: Some(now),
            created_at: now,
        },
    )
    .await?;
    repositories::submissions::create_if_absent(
        &mut *tx,
        &Uuid::new_v4().to_string(),
        &assignment.id,
        &user.id,
        now,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(assignment_id = %assignment.id, user_id = %user.id, test_id, "Practice started");
    Ok(assignment)
}

/// Assigns `test_id` to every active student among the requested ids. Unknown ids and
/// non-student accounts are skipped.
pub(crate) async fn bulk_assign(
    state: &AppState,
    admin: &User,
    request: BulkAssignRequest,
) -> Result<Vec<Assignment>, LifecycleError> {
    let db = state.db();
    let now = primitive_now_utc();
    let expires_at = to_primitive_utc(request.expires_at);
    if expires_at <= now {
        return Err(LifecycleError::Invalid("expires_at must be in the future".to_string()));
    }

    let test = catalog::grading_view(db, &request.test_id).await?;

    let mut student_ids = request.student_ids;
    student_ids.sort();
    student_ids.dedup();
    let students = repositories::users::list_active_students(db, &student_ids).await?;
    if students.is_empty() {
        return Err(LifecycleError::NotFound("No valid students found"));
    }

    let attempt_limit =
        request.attempt_limit.unwrap_or(state.settings().assignment().default_attempt_limit);

    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(students.len());
    for student in &students {
        let assignment = repositories::assignments::create(
            &mut *tx,
            CreateAssignment {
                id: &Uuid::new_v4().to_string(),
                test_id: &test.id,
                assigned_to: &student.id,
                assigned_by: &admin.id,
                expires_at,
                status: AssignmentStatus::Assigned,
                attempt_limit,
                override_duration_minutes: request.override_config.duration_minutes,
                override_question_count: request.override_config.question_count,
                started_at: None,
                created_at: now,
            },
        )
        .await?;
        created.push(assignment);
    }
    tx.commit().await?;

    tracing::info!(
        test_id = %test.id,
        admin_id = %admin.id,
        requested = student_ids.len(),
        assigned = created.len(),
        "Bulk assignment created"
    );

    notifications::dispatch_assignment_emails(
        state.clone(),
        students,
        test.metadata.0.clone(),
        expires_at,
    );

    Ok(created)
}
