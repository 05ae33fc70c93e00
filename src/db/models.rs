use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AssignmentStatus, UserRole};
use crate::schemas::submission::{CodingResult, QuizAnswer, SubmitRequest};
use crate::schemas::test::{TestConfig, TestMetadata, TestSection};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Row of the content store. Read-only outside of catalog seeding.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) metadata: Json<TestMetadata>,
    pub(crate) config: Json<TestConfig>,
    pub(crate) sections: Json<Vec<TestSection>>,
    pub(crate) is_active: bool,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Assignment {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) assigned_to: String,
    pub(crate) assigned_by: String,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) status: AssignmentStatus,
    pub(crate) attempt_limit: i32,
    pub(crate) override_duration_minutes: Option<i32>,
    pub(crate) override_question_count: Option<i32>,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Assignment {
    /// Self-assigned practice sessions never show up in admin-assigned listings.
    pub(crate) fn is_practice(&self) -> bool {
        self.assigned_by == self.assigned_to
    }

    pub(crate) fn is_past_deadline(&self, now: PrimitiveDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) quiz_answers: Json<Vec<QuizAnswer>>,
    pub(crate) coding: Json<Vec<CodingResult>>,
    /// Answers accepted with the status flip, kept until the graded result is written.
    pub(crate) pending_answers: Option<Json<SubmitRequest>>,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) quiz_score: Option<f64>,
    pub(crate) coding_score: Option<f64>,
    pub(crate) quiz_correct: Option<i32>,
    pub(crate) quiz_total: Option<i32>,
    pub(crate) coding_passed_hidden: Option<i32>,
    pub(crate) coding_total_hidden: Option<i32>,
    pub(crate) email_student_sent: bool,
    pub(crate) email_admin_sent: bool,
    pub(crate) email_last_error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
