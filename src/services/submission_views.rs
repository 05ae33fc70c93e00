//! Joins submissions and assignments with their test metadata and people for listings.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::db::models::{Assignment, Submission, Test, User};
use crate::repositories;
use crate::schemas::assignment::{AdminAssignmentItem, AssignmentResponse, UserSummary};
use crate::schemas::submission::{
    AdminSubmissionContext, AdminSubmissionDetail, SubmissionListItem, SubmissionResponse,
};
use crate::schemas::test::TestMetadata;

fn unique<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut ids: Vec<String> = ids.map(str::to_string).collect();
    ids.sort();
    ids.dedup();
    ids
}

async fn tests_by_id(pool: &PgPool, ids: Vec<String>) -> Result<HashMap<String, Test>, sqlx::Error> {
    Ok(repositories::catalog::find_many_by_ids(pool, &ids)
        .await?
        .into_iter()
        .map(|test| (test.id.clone(), test))
        .collect())
}

async fn users_by_id(pool: &PgPool, ids: Vec<String>) -> Result<HashMap<String, User>, sqlx::Error> {
    Ok(repositories::users::find_many_by_ids(pool, &ids)
        .await?
        .into_iter()
        .map(|user| (user.id.clone(), user))
        .collect())
}

fn user_summary(user: &User) -> UserSummary {
    UserSummary { id: user.id.clone(), name: user.name.clone(), email: user.email.clone() }
}

/// Listing rows for graded submissions. `with_user` adds the student's name and email.
pub(crate) async fn list_items(
    pool: &PgPool,
    submissions: Vec<Submission>,
    with_user: bool,
) -> Result<Vec<SubmissionListItem>, sqlx::Error> {
    let assignment_ids = unique(submissions.iter().map(|s| s.assignment_id.as_str()));
    let assignments: HashMap<String, Assignment> =
        repositories::assignments::find_many_by_ids(pool, &assignment_ids)
            .await?
            .into_iter()
            .map(|assignment| (assignment.id.clone(), assignment))
            .collect();
    let tests = tests_by_id(pool, unique(assignments.values().map(|a| a.test_id.as_str()))).await?;
    let users = if with_user {
        users_by_id(pool, unique(submissions.iter().map(|s| s.user_id.as_str()))).await?
    } else {
        HashMap::new()
    };

    Ok(submissions
        .into_iter()
        .map(|submission| {
            let metadata: Option<TestMetadata> = assignments
                .get(&submission.assignment_id)
                .and_then(|assignment| tests.get(&assignment.test_id))
                .map(|test| test.metadata.0.clone());
            let user = users.get(&submission.user_id);
            let summary = SubmissionResponse::from(submission);

            SubmissionListItem {
                id: summary.id,
                assignment_id: summary.assignment_id,
                user_id: summary.user_id,
                started_at: summary.started_at,
                submitted_at: summary.submitted_at,
                score: summary.score,
                max_score: summary.max_score,
                section_scores: summary.section_scores,
                test_title: metadata
                    .as_ref()
                    .map(|metadata| metadata.title.clone())
                    .unwrap_or_else(|| "Unknown test".to_string()),
                test_metadata: metadata,
                user_name: user.map(|user| user.name.clone()),
                user_email: user.map(|user| user.email.clone()),
            }
        })
        .collect())
}

pub(crate) async fn admin_assignment_items(
    pool: &PgPool,
    assignments: Vec<Assignment>,
) -> Result<Vec<AdminAssignmentItem>, sqlx::Error> {
    let tests = tests_by_id(pool, unique(assignments.iter().map(|a| a.test_id.as_str()))).await?;
    let people = users_by_id(
        pool,
        unique(
            assignments
                .iter()
                .flat_map(|a| [a.assigned_to.as_str(), a.assigned_by.as_str()]),
        ),
    )
    .await?;

    Ok(assignments
        .into_iter()
        .map(|assignment| AdminAssignmentItem {
            test_metadata: tests.get(&assignment.test_id).map(|test| test.metadata.0.clone()),
            assigned_to: people.get(&assignment.assigned_to).map(user_summary),
            assigned_by: people.get(&assignment.assigned_by).map(user_summary),
            assignment: AssignmentResponse::from(assignment),
        })
        .collect())
}

/// Submission for `assignment_id` with its assignment context. `None` when either is missing.
pub(crate) async fn admin_detail(
    pool: &PgPool,
    assignment_id: &str,
) -> Result<Option<AdminSubmissionDetail>, sqlx::Error> {
    let Some(assignment) = repositories::assignments::find_by_id(pool, assignment_id).await? else {
        return Ok(None);
    };
    let Some(submission) = repositories::submissions::find_by_assignment(pool, assignment_id).await?
    else {
        return Ok(None);
    };

    let mut items = admin_assignment_items(pool, vec![assignment]).await?;
    let Some(item) = items.pop() else {
        return Ok(None);
    };

    Ok(Some(AdminSubmissionDetail {
        context: AdminSubmissionContext { test_metadata: item.test_metadata.clone(), assignment: item },
        submission: SubmissionResponse::from(submission),
    }))
}
