use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use validator::Validate;

use crate::db::models::Assignment;
use crate::db::types::AssignmentStatus;
use crate::schemas::submission::{format_optional, format_primitive, SampleResult};
use crate::schemas::test::{StudentTestView, TestMetadata};

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) status: AssignmentStatus,
    pub(crate) expires_at: String,
    pub(crate) attempt_limit: i32,
    pub(crate) override_config: OverrideConfig,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) is_practice: bool,
}

impl From<Assignment> for AssignmentResponse {
    fn from(assignment: Assignment) -> Self {
        let is_practice = assignment.is_practice();
        Self {
            id: assignment.id,
            test_id: assignment.test_id,
            status: assignment.status,
            expires_at: format_primitive(assignment.expires_at),
            attempt_limit: assignment.attempt_limit,
            override_config: OverrideConfig {
                duration_minutes: assignment.override_duration_minutes,
                question_count: assignment.override_question_count,
            },
            started_at: format_optional(assignment.started_at),
            submitted_at: format_optional(assignment.submitted_at),
            created_at: format_primitive(assignment.created_at),
            is_practice,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Validate)]
pub(crate) struct OverrideConfig {
    #[serde(default, alias = "durationMinutes")]
    #[validate(range(min = 1, max = 300, message = "duration_minutes must be within 1..=300"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default, alias = "questionCount")]
    #[validate(range(min = 1, message = "question_count must be positive"))]
    pub(crate) question_count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MyAssignmentItem {
    #[serde(flatten)]
    pub(crate) assignment: AssignmentResponse,
    pub(crate) test: Option<AssignmentTestSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentTestSummary {
    pub(crate) metadata: TestMetadata,
    pub(crate) is_active: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EffectiveConfig {
    pub(crate) duration_minutes: i32,
    pub(crate) question_count: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AssignmentDetailResponse {
    pub(crate) assignment: AssignmentResponse,
    pub(crate) effective_config: EffectiveConfig,
    pub(crate) test: StudentTestView,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartResponse {
    pub(crate) message: &'static str,
    pub(crate) assignment: AssignmentResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RunRequest {
    #[serde(alias = "problemId")]
    #[validate(length(min = 1, message = "problem_id must not be empty"))]
    pub(crate) problem_id: String,
    pub(crate) language: String,
    #[serde(alias = "sourceCode")]
    #[validate(length(max = 100_000, message = "source_code is too large"))]
    pub(crate) source_code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunResponse {
    pub(crate) problem_id: String,
    pub(crate) results: Vec<SampleResult>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RunCustomRequest {
    pub(crate) language: String,
    #[serde(alias = "sourceCode")]
    #[validate(length(max = 100_000, message = "source_code is too large"))]
    pub(crate) source_code: String,
    #[serde(default, alias = "customInput", alias = "input")]
    #[validate(length(max = 20_000, message = "custom_input is too large"))]
    pub(crate) custom_input: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunCustomResponse {
    pub(crate) actual_output: String,
    pub(crate) runtime_ms: Option<u64>,
    pub(crate) error: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PracticeStartRequest {
    #[serde(alias = "testId")]
    #[validate(length(min = 1, message = "test_id is required"))]
    pub(crate) test_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PracticeStartResponse {
    pub(crate) message: &'static str,
    pub(crate) assignment_id: String,
    pub(crate) assignment: AssignmentResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BulkAssignRequest {
    #[serde(alias = "testId")]
    #[validate(length(min = 1, message = "test_id is required"))]
    pub(crate) test_id: String,
    #[serde(alias = "studentIds", alias = "userIds", alias = "user_ids")]
    #[validate(length(min = 1, max = 1000, message = "student_ids must contain 1..=1000 ids"))]
    pub(crate) student_ids: Vec<String>,
    #[serde(alias = "expiresAt", deserialize_with = "deserialize_instant")]
    pub(crate) expires_at: OffsetDateTime,
    #[serde(default, alias = "overrideConfig")]
    #[validate(nested)]
    pub(crate) override_config: OverrideConfig,
    #[serde(default, alias = "attemptLimit")]
    #[validate(range(min = 1, max = 10, message = "attempt_limit must be within 1..=10"))]
    pub(crate) attempt_limit: Option<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkAssignResponse {
    pub(crate) message: String,
    pub(crate) assigned_count: usize,
    pub(crate) assignment_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminAssignmentQuery {
    pub(crate) status: Option<String>,
    #[serde(alias = "userId")]
    pub(crate) user_id: Option<String>,
    #[serde(alias = "testId")]
    pub(crate) test_id: Option<String>,
    pub(crate) skip: Option<i64>,
    pub(crate) limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct UserSummary {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminAssignmentItem {
    #[serde(flatten)]
    pub(crate) assignment: AssignmentResponse,
    pub(crate) test_metadata: Option<TestMetadata>,
    pub(crate) assigned_to: Option<UserSummary>,
    pub(crate) assigned_by: Option<UserSummary>,
}

/// RFC 3339, or a zone-less `YYYY-MM-DDTHH:MM[:SS]` read as UTC.
fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    let with_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let without_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    PrimitiveDateTime::parse(raw, &with_seconds)
        .or_else(|_| PrimitiveDateTime::parse(raw, &without_seconds))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_instant(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parse_instant_accepts_rfc3339_and_local_forms() {
        assert_eq!(parse_instant("2026-03-01T10:00:00Z"), Some(datetime!(2026-03-01 10:00:00 UTC)));
        assert_eq!(
            parse_instant("2026-03-01T13:00:00+03:00"),
            Some(datetime!(2026-03-01 10:00:00 UTC))
        );
        assert_eq!(parse_instant("2026-03-01T10:00"), Some(datetime!(2026-03-01 10:00:00 UTC)));
        assert_eq!(parse_instant("next tuesday"), None);
    }

    #[test]
    fn bulk_assign_request_accepts_camel_case_aliases() {
        let payload = serde_json::json!({
            "testId": "t-1",
            "userIds": ["u-1", "u-2"],
            "expiresAt": "2030-01-01T00:00:00Z",
            "overrideConfig": { "durationMinutes": 45 },
            "attemptLimit": 2
        });

        let request: BulkAssignRequest = serde_json::from_value(payload).expect("request");
        assert_eq!(request.student_ids.len(), 2);
        assert_eq!(request.override_config.duration_minutes, Some(45));
        assert_eq!(request.override_config.question_count, None);
        assert_eq!(request.attempt_limit, Some(2));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn bulk_assign_request_rejects_empty_student_list() {
        let payload = serde_json::json!({
            "test_id": "t-1",
            "student_ids": [],
            "expires_at": "2030-01-01T00:00:00Z"
        });

        let request: BulkAssignRequest = serde_json::from_value(payload).expect("request");
        assert!(request.validate().is_err());
    }
}
