use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct DashboardResponse {
    pub(crate) assigned_active: i64,
    pub(crate) assigned_expired: i64,
    pub(crate) practice_taken_this_month: i64,
    pub(crate) assigned_taken_this_month: i64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MonthlyReportResponse {
    /// `February 2026`
    pub(crate) month_name: String,
    /// `2026-02`
    pub(crate) month: String,
    pub(crate) assigned_total: i64,
    pub(crate) assigned_completed: i64,
    pub(crate) submissions: i64,
    pub(crate) avg_score: i64,
    pub(crate) practice_taken: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonthlyReportEmailResponse {
    pub(crate) message: &'static str,
    pub(crate) report: MonthlyReportResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct OverviewResponse {
    pub(crate) users: i64,
    pub(crate) tests: i64,
    pub(crate) active_assignments: i64,
    pub(crate) submissions_this_month: i64,
}
