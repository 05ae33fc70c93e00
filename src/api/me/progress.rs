use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::report::{DashboardResponse, MonthlyReportEmailResponse, MonthlyReportResponse};
use crate::schemas::submission::{SubmissionListItem, SubmissionResponse};
use crate::services::{notifications, reporting, submission_views};

pub(super) async fn list_submissions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionListItem>>, ApiError> {
    let submissions =
        repositories::submissions::list_submitted_by_user(state.db(), &user.id).await?;
    let items = submission_views::list_items(state.db(), submissions, false).await?;
    Ok(Json(items))
}

pub(super) async fn get_submission(
    Path(assignment_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    repositories::assignments::find_for_user(state.db(), &assignment_id, &user.id)
        .await?
        .ok_or(ApiError::NotFound("Assignment not found".to_string()))?;

    let submission = repositories::submissions::find_by_assignment(state.db(), &assignment_id)
        .await?
        .filter(|submission| submission.submitted_at.is_some())
        .ok_or(ApiError::NotFound("Submission not found".to_string()))?;

    Ok(Json(SubmissionResponse::from(submission)))
}

pub(super) async fn dashboard(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let dashboard = reporting::dashboard(state.db(), &user, primitive_now_utc()).await?;
    Ok(Json(dashboard))
}

pub(super) async fn monthly_report(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MonthlyReportResponse>, ApiError> {
    let report = reporting::monthly_report(state.db(), &user, primitive_now_utc()).await?;
    Ok(Json(report))
}

pub(super) async fn email_monthly_report(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MonthlyReportEmailResponse>, ApiError> {
    let report = reporting::monthly_report(state.db(), &user, primitive_now_utc()).await?;

    notifications::send_monthly_report(state.notifier().as_ref(), &user, &report)
        .await
        .map_err(|err| {
            tracing::warn!(user_id = %user.id, error = %err, "Monthly report email failed");
            ApiError::ServiceUnavailable("Email delivery failed".to_string())
        })?;

    Ok(Json(MonthlyReportEmailResponse { message: "Monthly report sent", report }))
}
