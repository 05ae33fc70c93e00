use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::{default_limit, PageQuery};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::AssignmentStatus;
use crate::repositories;
use crate::repositories::assignments::AssignmentFilter;
use crate::schemas::assignment::{
    AdminAssignmentItem, AdminAssignmentQuery, BulkAssignRequest, BulkAssignResponse,
};
use crate::schemas::report::OverviewResponse;
use crate::schemas::submission::{AdminSubmissionDetail, SubmissionListItem};
use crate::services::{assignment_lifecycle, reporting, submission_views};

pub(super) async fn bulk_assign(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<BulkAssignRequest>,
) -> Result<(StatusCode, Json<BulkAssignResponse>), ApiError> {
    validate_payload(&payload)?;

    let created = assignment_lifecycle::bulk_assign(&state, &admin, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(BulkAssignResponse {
            message: format!("Assigned to {} students", created.len()),
            assigned_count: created.len(),
            assignment_ids: created.into_iter().map(|assignment| assignment.id).collect(),
        }),
    ))
}

pub(super) async fn list_assignments(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(params): Query<AdminAssignmentQuery>,
) -> Result<Json<Vec<AdminAssignmentItem>>, ApiError> {
    let status = match params.status.as_deref().filter(|value| !value.is_empty()) {
        Some(raw) => Some(
            AssignmentStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown status '{raw}'")))?,
        ),
        None => None,
    };

    let assignments = repositories::assignments::list_filtered(
        state.db(),
        AssignmentFilter {
            status,
            user_id: params.user_id.as_deref(),
            test_id: params.test_id.as_deref(),
            skip: params.skip.unwrap_or(0),
            limit: params.limit.unwrap_or_else(default_limit),
        },
    )
    .await?;

    let items = submission_views::admin_assignment_items(state.db(), assignments).await?;
    Ok(Json(items))
}

pub(super) async fn list_submissions(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<SubmissionListItem>>, ApiError> {
    let submissions =
        repositories::submissions::list_submitted(state.db(), page.skip, page.limit).await?;
    let items = submission_views::list_items(state.db(), submissions, true).await?;
    Ok(Json(items))
}

pub(super) async fn get_submission(
    Path(assignment_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<AdminSubmissionDetail>, ApiError> {
    let detail = submission_views::admin_detail(state.db(), &assignment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;
    Ok(Json(detail))
}

pub(super) async fn overview(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let overview = reporting::overview(state.db(), primitive_now_utc()).await?;
    Ok(Json(overview))
}
