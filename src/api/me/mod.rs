//! Routes for the signed-in student.

mod assignments;
mod practice;
mod progress;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/assignments", get(assignments::list_assignments))
        .route("/assignments/:assignment_id", get(assignments::get_assignment))
        .route("/assignments/:assignment_id/start", post(assignments::start_assignment))
        .route("/assignments/:assignment_id/submit", post(assignments::submit_assignment))
        .route("/assignments/:assignment_id/run", post(assignments::run_code))
        .route("/assignments/:assignment_id/run-custom", post(assignments::run_custom_code))
        .route("/practice-tests", get(practice::list_practice_tests))
        .route("/practice/start", post(practice::start_practice))
        .route("/submissions", get(progress::list_submissions))
        .route("/submissions/:assignment_id", get(progress::get_submission))
        .route("/dashboard", get(progress::dashboard))
        .route("/reports/monthly", get(progress::monthly_report))
        .route("/reports/monthly/email", post(progress::email_monthly_report))
}

#[cfg(test)]
mod tests;
