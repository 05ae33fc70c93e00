use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::Submission;
use crate::schemas::test::TestMetadata;

pub(crate) use crate::core::time::{format_optional, format_primitive};

const MAX_SOURCE_BYTES: u64 = 100_000;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct QuizAnswer {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(alias = "selectedOption")]
    pub(crate) selected_option: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct CodingAnswer {
    #[serde(alias = "problemId")]
    #[validate(length(min = 1, message = "problem_id must not be empty"))]
    pub(crate) problem_id: String,
    pub(crate) language: String,
    #[serde(alias = "sourceCode")]
    #[validate(length(max = MAX_SOURCE_BYTES, message = "source_code is too large"))]
    pub(crate) source_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[serde(default, alias = "quizAnswers")]
    #[validate(length(max = 500, message = "too many quiz answers"), nested)]
    pub(crate) quiz_answers: Vec<QuizAnswer>,
    #[serde(default)]
    #[validate(length(max = 50, message = "too many coding answers"), nested)]
    pub(crate) coding: Vec<CodingAnswer>,
}

/// Outcome of one visible test case. Hidden cases never produce one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SampleResult {
    pub(crate) input: String,
    pub(crate) expected_output: String,
    pub(crate) actual_output: String,
    pub(crate) passed: bool,
    pub(crate) runtime_ms: Option<u64>,
    pub(crate) error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HiddenSummary {
    pub(crate) total: u32,
    pub(crate) passed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CodingResult {
    pub(crate) problem_id: String,
    pub(crate) language: String,
    pub(crate) source_code: String,
    pub(crate) sample_results: Vec<SampleResult>,
    pub(crate) hidden_summary: HiddenSummary,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct SectionScores {
    pub(crate) quiz: f64,
    pub(crate) coding: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct ScoreBreakdown {
    pub(crate) quiz_correct: u32,
    pub(crate) quiz_total: u32,
    pub(crate) coding_passed_hidden: u32,
    pub(crate) coding_total_hidden: u32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EmailStatus {
    pub(crate) student_sent: bool,
    pub(crate) admin_sent: bool,
    pub(crate) last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) section_scores: Option<SectionScores>,
    pub(crate) breakdown: Option<ScoreBreakdown>,
    pub(crate) quiz_answers: Vec<QuizAnswer>,
    pub(crate) coding: Vec<CodingResult>,
    pub(crate) email_status: EmailStatus,
    pub(crate) created_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        let section_scores = section_scores(&submission);
        let breakdown = breakdown(&submission);
        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            user_id: submission.user_id,
            started_at: format_optional(submission.started_at),
            submitted_at: format_optional(submission.submitted_at),
            score: submission.score,
            max_score: submission.max_score,
            section_scores,
            breakdown,
            quiz_answers: submission.quiz_answers.0,
            coding: submission.coding.0,
            email_status: EmailStatus {
                student_sent: submission.email_student_sent,
                admin_sent: submission.email_admin_sent,
                last_error: submission.email_last_error,
            },
            created_at: format_primitive(submission.created_at),
        }
    }
}

fn section_scores(submission: &Submission) -> Option<SectionScores> {
    match (submission.quiz_score, submission.coding_score) {
        (Some(quiz), Some(coding)) => Some(SectionScores { quiz, coding }),
        _ => None,
    }
}

fn breakdown(submission: &Submission) -> Option<ScoreBreakdown> {
    Some(ScoreBreakdown {
        quiz_correct: u32::try_from(submission.quiz_correct?).unwrap_or(0),
        quiz_total: u32::try_from(submission.quiz_total?).unwrap_or(0),
        coding_passed_hidden: u32::try_from(submission.coding_passed_hidden?).unwrap_or(0),
        coding_total_hidden: u32::try_from(submission.coding_total_hidden?).unwrap_or(0),
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) message: &'static str,
    pub(crate) submission: SubmissionResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionListItem {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: Option<f64>,
    pub(crate) section_scores: Option<SectionScores>,
    pub(crate) test_title: String,
    pub(crate) test_metadata: Option<TestMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) user_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminSubmissionDetail {
    pub(crate) context: AdminSubmissionContext,
    pub(crate) submission: SubmissionResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminSubmissionContext {
    pub(crate) assignment: crate::schemas::assignment::AdminAssignmentItem,
    pub(crate) test_metadata: Option<TestMetadata>,
}
