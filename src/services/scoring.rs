use std::collections::HashMap;

use crate::db::models::Test;
use crate::schemas::submission::{CodingAnswer, QuizAnswer, ScoreBreakdown};
use crate::services::catalog;
use crate::services::code_execution::{CodeExecutor, CodingEvaluation};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct QuizScore {
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) correct: u32,
    pub(crate) total: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct SubmissionScore {
    pub(crate) quiz: QuizScore,
    pub(crate) coding: CodingEvaluation,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) breakdown: ScoreBreakdown,
}

/// Exact-match quiz scoring, one point per question.
///
/// Unanswered questions contribute nothing, unknown question ids are ignored, and every
/// wrong answer costs `negative_marking`. The score never drops below zero.
pub(crate) fn score_quiz(test: &Test, answers: &[QuizAnswer], negative_marking: f64) -> QuizScore {
    let questions: HashMap<&str, &str> = catalog::quiz_questions(&test.sections)
        .map(|question| (question.id.as_str(), question.correct_answer.as_str()))
        .collect();

    // Later answers for the same question replace earlier ones.
    let answers: HashMap<&str, &str> = answers
        .iter()
        .map(|answer| (answer.question_id.as_str(), answer.selected_option.as_str()))
        .collect();

    let mut correct = 0u32;
    let mut wrong = 0u32;
    for (question_id, selected) in answers {
        match questions.get(question_id) {
            Some(expected) if *expected == selected => correct += 1,
            Some(_) => wrong += 1,
            None => {}
        }
    }

    let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
    let score = (f64::from(correct) - f64::from(wrong) * negative_marking).max(0.0);

    QuizScore { score, max_score: f64::from(total), correct, total }
}

pub(crate) async fn score_submission(
    executor: &CodeExecutor,
    test: &Test,
    quiz_answers: &[QuizAnswer],
    coding_answers: &[CodingAnswer],
) -> SubmissionScore {
    let quiz = score_quiz(test, quiz_answers, test.config.negative_marking);
    let coding = executor
        .evaluate_for_scoring(&test.sections, coding_answers, test.config.score_per_testcase)
        .await;

    let breakdown = ScoreBreakdown {
        quiz_correct: quiz.correct,
        quiz_total: quiz.total,
        coding_passed_hidden: coding.passed_hidden,
        coding_total_hidden: coding.total_hidden,
    };

    SubmissionScore {
        score: quiz.score + coding.score,
        max_score: quiz.max_score + coding.max_score,
        quiz,
        coding,
        breakdown,
    }
}
