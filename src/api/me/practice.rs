use axum::{extract::State, http::StatusCode, Json};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::assignment::{AssignmentResponse, PracticeStartRequest, PracticeStartResponse};
use crate::schemas::test::TestSummary;
use crate::services::{assignment_lifecycle, catalog};

pub(super) async fn list_practice_tests(
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TestSummary>>, ApiError> {
    let tests = repositories::catalog::list_active_practice(state.db()).await?;
    Ok(Json(tests.iter().map(catalog::summary).collect()))
}

pub(super) async fn start_practice(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<PracticeStartRequest>,
) -> Result<(StatusCode, Json<PracticeStartResponse>), ApiError> {
    validate_payload(&payload)?;

    let assignment = assignment_lifecycle::start_practice(&state, &user, &payload.test_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(PracticeStartResponse {
            message: "Practice started",
            assignment_id: assignment.id.clone(),
            assignment: AssignmentResponse::from(assignment),
        }),
    ))
}
