//! Admin-only routes: bulk assignment and read access to everyone's results.

mod handlers;

use axum::{routing::get, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/assignments", get(handlers::list_assignments).post(handlers::bulk_assign))
        .route("/submissions", get(handlers::list_submissions))
        .route("/submissions/:assignment_id", get(handlers::get_submission))
        .route("/overview", get(handlers::overview))
}
