use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::db::models::Test;
use crate::repositories;
use crate::schemas::assignment::{
    AssignmentDetailResponse, AssignmentResponse, AssignmentTestSummary, MyAssignmentItem,
    RunCustomRequest, RunCustomResponse, RunRequest, RunResponse, StartResponse,
};
use crate::schemas::submission::{SubmissionResponse, SubmitRequest, SubmitResponse};
use crate::services::{assignment_lifecycle, catalog};

pub(super) async fn list_assignments(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MyAssignmentItem>>, ApiError> {
    let assignments = assignment_lifecycle::list_for_student(&state, &user).await?;

    let mut test_ids: Vec<String> =
        assignments.iter().map(|assignment| assignment.test_id.clone()).collect();
    test_ids.sort();
    test_ids.dedup();
    let tests: HashMap<String, Test> =
        repositories::catalog::find_many_by_ids(state.db(), &test_ids)
            .await?
            .into_iter()
            .map(|test| (test.id.clone(), test))
            .collect();

    let items = assignments
        .into_iter()
        .map(|assignment| {
            let test = tests.get(&assignment.test_id).map(|test| AssignmentTestSummary {
                metadata: test.metadata.0.clone(),
                is_active: test.is_active,
            });
            MyAssignmentItem { assignment: AssignmentResponse::from(assignment), test }
        })
        .collect();

    Ok(Json(items))
}

pub(super) async fn get_assignment(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AssignmentDetailResponse>, ApiError> {
    let (assignment, test) = assignment_lifecycle::detail(&state, &assignment_id, &user).await?;

    Ok(Json(AssignmentDetailResponse {
        effective_config: catalog::effective_config(&assignment, &test),
        test: catalog::student_view(&test),
        assignment: AssignmentResponse::from(assignment),
    }))
}

pub(super) async fn start_assignment(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StartResponse>, ApiError> {
    let assignment = assignment_lifecycle::start(&state, &assignment_id, &user).await?;

    Ok(Json(StartResponse {
        message: "Assignment started",
        assignment: AssignmentResponse::from(assignment),
    }))
}

pub(super) async fn submit_assignment(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    validate_payload(&payload)?;

    let submission =
        assignment_lifecycle::submit(&state, &assignment_id, &user, &payload).await?;

    Ok(Json(SubmitResponse {
        message: "Submitted successfully",
        submission: SubmissionResponse::from(submission),
    }))
}

pub(super) async fn run_code(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    validate_payload(&payload)?;

    let results =
        assignment_lifecycle::run_sample_code(&state, &assignment_id, &user, &payload).await?;

    Ok(Json(RunResponse { problem_id: payload.problem_id, results }))
}

pub(super) async fn run_custom_code(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RunCustomRequest>,
) -> Result<Json<RunCustomResponse>, ApiError> {
    validate_payload(&payload)?;

    let response =
        assignment_lifecycle::run_custom_code(&state, &assignment_id, &user, &payload).await?;

    Ok(Json(response))
}
