//! Read-side access to test definitions.
//!
//! [`student_view`] is the only projection that may leave the server. The full row
//! returned by [`grading_view`] carries correct answers and hidden cases.

use std::collections::HashSet;

use sqlx::PgPool;
use thiserror::Error;

use crate::db::models::{Assignment, Test};
use crate::repositories;
use crate::schemas::assignment::EffectiveConfig;
use crate::schemas::test::{
    CodingProblem, QuizQuestion, SampleCase, StudentProblem, StudentQuestion, StudentSection,
    StudentTestConfig, StudentTestView, TestDefinition, TestSection, TestSummary,
};

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("test not found or inactive")]
    NotFound,
    #[error("invalid test definition: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Full definition for grading. Inactive tests are invisible to new attempts.
pub(crate) async fn grading_view(pool: &PgPool, test_id: &str) -> Result<Test, CatalogError> {
    match repositories::catalog::find_by_id(pool, test_id).await? {
        Some(test) if test.is_active => Ok(test),
        _ => Err(CatalogError::NotFound),
    }
}

pub(crate) fn student_view(test: &Test) -> StudentTestView {
    let sections = test
        .sections
        .iter()
        .map(|section| match section {
            TestSection::Quiz { title, questions } => StudentSection::Quiz {
                title: title.clone(),
                questions: questions
                    .iter()
                    .map(|question| StudentQuestion {
                        id: question.id.clone(),
                        question: question.question.clone(),
                        options: question.options.clone(),
                    })
                    .collect(),
            },
            TestSection::Coding { title, problems } => StudentSection::Coding {
                title: title.clone(),
                problems: problems.iter().map(student_problem).collect(),
            },
        })
        .collect();

    StudentTestView {
        id: test.id.clone(),
        metadata: test.metadata.0.clone(),
        config: StudentTestConfig {
            question_count: test.config.question_count,
            negative_marking: test.config.negative_marking,
            score_per_testcase: test.config.score_per_testcase,
        },
        sections,
    }
}

fn student_problem(problem: &CodingProblem) -> StudentProblem {
    StudentProblem {
        id: problem.id.clone(),
        title: problem.title.clone(),
        statement: problem.statement.clone(),
        input_format: problem.input_format.clone(),
        output_format: problem.output_format.clone(),
        constraints: problem.constraints.clone(),
        languages: problem.languages.clone(),
        starter_code: problem.starter_code.clone(),
        testcases: problem
            .samples()
            .map(|case| SampleCase {
                input: case.input.clone(),
                output: case.output.clone(),
                is_sample: true,
            })
            .collect(),
    }
}

pub(crate) fn summary(test: &Test) -> TestSummary {
    TestSummary {
        id: test.id.clone(),
        metadata: test.metadata.0.clone(),
        is_active: test.is_active,
        created_at: crate::core::time::format_primitive(test.created_at),
    }
}

pub(crate) fn quiz_questions(sections: &[TestSection]) -> impl Iterator<Item = &QuizQuestion> {
    sections.iter().flat_map(|section| match section {
        TestSection::Quiz { questions, .. } => questions.as_slice(),
        TestSection::Coding { .. } => &[][..],
    })
}

pub(crate) fn coding_problems(sections: &[TestSection]) -> impl Iterator<Item = &CodingProblem> {
    sections.iter().flat_map(|section| match section {
        TestSection::Coding { problems, .. } => problems.as_slice(),
        TestSection::Quiz { .. } => &[][..],
    })
}

pub(crate) fn find_problem<'a>(test: &'a Test, problem_id: &str) -> Option<&'a CodingProblem> {
    coding_problems(&test.sections).find(|problem| problem.id == problem_id)
}

/// Assignment overrides win over the test's own duration and question count.
pub(crate) fn effective_config(assignment: &Assignment, test: &Test) -> EffectiveConfig {
    EffectiveConfig {
        duration_minutes: assignment
            .override_duration_minutes
            .unwrap_or(test.metadata.duration_minutes),
        question_count: assignment.override_question_count.or(test.config.question_count),
    }
}

pub(crate) fn validate_definition(definition: &TestDefinition) -> Result<(), CatalogError> {
    let key = &definition.metadata.id;
    if key.trim().is_empty() {
        return Err(CatalogError::Invalid("metadata.id is required".to_string()));
    }
    if definition.metadata.duration_minutes <= 0 {
        return Err(CatalogError::Invalid(format!("{key}: duration_minutes must be positive")));
    }
    if definition.config.negative_marking < 0.0 {
        return Err(CatalogError::Invalid(format!("{key}: negative_marking must be >= 0")));
    }
    if definition.config.score_per_testcase <= 0.0 {
        return Err(CatalogError::Invalid(format!("{key}: score_per_testcase must be positive")));
    }

    let mut seen_questions = HashSet::new();
    for question in quiz_questions(&definition.sections) {
        if !seen_questions.insert(question.id.as_str()) {
            return Err(CatalogError::Invalid(format!(
                "{key}: duplicate question id {}",
                question.id
            )));
        }
        if !(2..=6).contains(&question.options.len()) {
            return Err(CatalogError::Invalid(format!(
                "{key}: question {} needs 2..6 options",
                question.id
            )));
        }
        if !question.options.contains(&question.correct_answer) {
            return Err(CatalogError::Invalid(format!(
                "{key}: question {} correct_answer is not an option",
                question.id
            )));
        }
    }

    let mut seen_problems = HashSet::new();
    for problem in coding_problems(&definition.sections) {
        if !seen_problems.insert(problem.id.as_str()) {
            return Err(CatalogError::Invalid(format!(
                "{key}: duplicate problem id {}",
                problem.id
            )));
        }
        if problem.languages.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "{key}: problem {} allows no languages",
                problem.id
            )));
        }
        if problem.samples().next().is_none() || problem.hidden().next().is_none() {
            return Err(CatalogError::Invalid(format!(
                "{key}: problem {} needs at least one sample and one hidden case",
                problem.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::test::TestCase;
    use crate::test_support::{fixture_definition, fixture_test};

    #[test]
    fn student_view_strips_answers_and_hidden_cases() {
        let test = fixture_test("test-1");

        let view = student_view(&test);
        let json = serde_json::to_value(&view).expect("serialize");
        let text = json.to_string();

        assert!(!text.contains("correct_answer"));
        assert!(!text.contains("explanation"));
        for hidden in ["10 20", "olleh"] {
            assert!(!text.contains(hidden), "hidden case {hidden} leaked");
        }

        let problems: Vec<_> = view
            .sections
            .iter()
            .filter_map(|section| match section {
                StudentSection::Coding { problems, .. } => Some(problems),
                StudentSection::Quiz { .. } => None,
            })
            .flatten()
            .collect();
        assert_eq!(problems.len(), 2);
        for problem in problems {
            assert_eq!(problem.testcases.len(), 2);
            assert!(problem.testcases.iter().all(|case| case.is_sample));
        }
    }

    #[test]
    fn effective_config_prefers_overrides() {
        let test = fixture_test("test-1");
        let mut assignment = crate::test_support::fixture_assignment("a-1", "test-1", "s-1", "admin");

        let config = effective_config(&assignment, &test);
        assert_eq!(config.duration_minutes, 30);
        assert_eq!(config.question_count, None);

        assignment.override_duration_minutes = Some(45);
        assignment.override_question_count = Some(1);
        let config = effective_config(&assignment, &test);
        assert_eq!(config.duration_minutes, 45);
        assert_eq!(config.question_count, Some(1));
    }

    #[test]
    fn fixture_definition_is_valid() {
        assert!(validate_definition(&fixture_definition("T-MIX-001")).is_ok());
    }

    #[test]
    fn validate_rejects_problem_without_hidden_cases() {
        let mut definition = fixture_definition("T-MIX-001");
        for section in &mut definition.sections {
            if let TestSection::Coding { problems, .. } = section {
                problems[0].testcases.retain(|case| case.is_sample);
            }
        }

        assert!(matches!(validate_definition(&definition), Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_answer_outside_options() {
        let mut definition = fixture_definition("T-MIX-001");
        for section in &mut definition.sections {
            if let TestSection::Quiz { questions, .. } = section {
                questions[0].correct_answer = "Z".to_string();
            }
        }

        assert!(matches!(validate_definition(&definition), Err(CatalogError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_single_option_and_empty_languages() {
        let mut definition = fixture_definition("T-MIX-001");
        for section in &mut definition.sections {
            match section {
                TestSection::Quiz { questions, .. } => questions[0].options.truncate(1),
                TestSection::Coding { .. } => {}
            }
        }
        assert!(validate_definition(&definition).is_err());

        let mut definition = fixture_definition("T-MIX-001");
        for section in &mut definition.sections {
            if let TestSection::Coding { problems, .. } = section {
                problems[1].languages.clear();
                problems[1].testcases.push(TestCase {
                    input: "z".into(),
                    output: "z".into(),
                    is_sample: false,
                });
            }
        }
        assert!(validate_definition(&definition).is_err());
    }
}
