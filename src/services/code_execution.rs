//! Orchestrates runner calls for one coding problem at a time.
//!
//! Every entry point returns one result per input case. Runner failures, timeouts and
//! invalid submissions all degrade into failed cases carrying an error string.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::schemas::assignment::RunCustomResponse;
use crate::schemas::submission::{CodingAnswer, CodingResult, HiddenSummary, SampleResult};
use crate::schemas::test::{CodingProblem, Language, TestCase, TestSection};
use crate::services::catalog;
use crate::services::code_runner::{
    CodeRunner, RunBatch, RunnerCase, RunnerCaseResult, RunnerError,
};

const NO_SUBMISSION: &str = "No submission";

/// Result of grading every coding problem of a test.
#[derive(Debug, Clone, Default)]
pub(crate) struct CodingEvaluation {
    pub(crate) results: Vec<CodingResult>,
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) passed_hidden: u32,
    pub(crate) total_hidden: u32,
}

pub(crate) struct CodeExecutor {
    runner: Arc<dyn CodeRunner>,
    batch_timeout: Duration,
}

impl CodeExecutor {
    pub(crate) fn new(runner: Arc<dyn CodeRunner>, batch_timeout: Duration) -> Self {
        Self { runner, batch_timeout }
    }

    /// Ungraded try-run against the problem's sample cases.
    pub(crate) async fn run_samples(
        &self,
        problem: &CodingProblem,
        language: &str,
        source_code: &str,
    ) -> Vec<SampleResult> {
        let samples: Vec<&TestCase> = problem.samples().collect();
        match check_submission(problem, language, source_code) {
            Ok(language) => {
                let outcome = self.execute(language, source_code, &samples).await;
                sample_results(&samples, outcome)
            }
            Err(reason) => failed_samples(&samples, &reason),
        }
    }

    /// Single free-form run with no expected output.
    pub(crate) async fn run_custom(
        &self,
        language: &str,
        source_code: &str,
        custom_input: &str,
    ) -> RunCustomResponse {
        let Some(language) = Language::parse(language) else {
            return RunCustomResponse {
                actual_output: String::new(),
                runtime_ms: None,
                error: format!("Unsupported language: {language}"),
            };
        };

        let case = TestCase { input: custom_input.to_string(), output: String::new(), is_sample: true };
        match self.execute(language, source_code, &[&case]).await {
            Ok(mut results) if !results.is_empty() => {
                let result = results.swap_remove(0);
                RunCustomResponse {
                    actual_output: result.actual_output,
                    runtime_ms: result.runtime_ms,
                    error: result.error,
                }
            }
            Ok(_) => RunCustomResponse {
                actual_output: String::new(),
                runtime_ms: None,
                error: "Code runner returned no result".to_string(),
            },
            Err(err) => RunCustomResponse {
                actual_output: String::new(),
                runtime_ms: None,
                error: err.to_string(),
            },
        }
    }

    /// Grades every coding problem in `sections`. A missing or invalid answer only zeroes
    /// its own problem.
    pub(crate) async fn evaluate_for_scoring(
        &self,
        sections: &[TestSection],
        answers: &[CodingAnswer],
        score_per_testcase: f64,
    ) -> CodingEvaluation {
        // Later answers for the same problem replace earlier ones.
        let answers: HashMap<&str, &CodingAnswer> =
            answers.iter().map(|answer| (answer.problem_id.as_str(), answer)).collect();

        let mut evaluation = CodingEvaluation::default();
        let mut passed_cases = 0u32;
        let mut total_cases = 0u32;

        for problem in catalog::coding_problems(sections) {
            let samples: Vec<&TestCase> = problem.samples().collect();
            let hidden: Vec<&TestCase> = problem.hidden().collect();
            let answer = answers.get(problem.id.as_str()).copied();

            let (language, source_code) = answer
                .map(|answer| (answer.language.clone(), answer.source_code.clone()))
                .unwrap_or_default();

            let (language, sample_results, hidden_summary) =
                match check_submission(problem, &language, &source_code) {
                    Ok(parsed) => {
                        let sample_outcome = self.execute(parsed, &source_code, &samples).await;
                        let hidden_outcome = self.execute(parsed, &source_code, &hidden).await;
                        (
                            parsed.as_str().to_string(),
                            sample_results(&samples, sample_outcome),
                            hidden_summary(&hidden, hidden_outcome),
                        )
                    }
                    Err(reason) => {
                        tracing::debug!(problem_id = %problem.id, reason = %reason, "Coding answer not executed");
                        (
                            language,
                            failed_samples(&samples, &reason),
                            HiddenSummary { total: count(hidden.len()), passed: 0 },
                        )
                    }
                };

            let sample_passed = count(sample_results.iter().filter(|result| result.passed).count());
            passed_cases += sample_passed + hidden_summary.passed;
            total_cases += count(samples.len()) + hidden_summary.total;
            evaluation.passed_hidden += hidden_summary.passed;
            evaluation.total_hidden += hidden_summary.total;

            evaluation.results.push(CodingResult {
                problem_id: problem.id.clone(),
                language,
                source_code,
                sample_results,
                hidden_summary,
            });
        }

        evaluation.score = score_per_testcase * f64::from(passed_cases);
        evaluation.max_score = score_per_testcase * f64::from(total_cases);
        evaluation
    }

    async fn execute(
        &self,
        language: Language,
        source_code: &str,
        cases: &[&TestCase],
    ) -> Result<Vec<RunnerCaseResult>, RunnerError> {
        if cases.is_empty() {
            return Ok(Vec::new());
        }

        let batch = RunBatch {
            language: language.as_str().to_string(),
            source_code: source_code.to_string(),
            testcases: cases
                .iter()
                .map(|case| RunnerCase { input: case.input.clone(), output: case.output.clone() })
                .collect(),
        };

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.batch_timeout, self.runner.run(batch)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RunnerError::Timeout(self.batch_timeout.as_millis() as u64)),
        };
        metrics::histogram!("code_runner_batch_seconds").record(started.elapsed().as_secs_f64());

        let outcome = outcome.and_then(|results| {
            if results.len() == cases.len() {
                Ok(results)
            } else {
                Err(RunnerError::Malformed(format!(
                    "expected {} results, got {}",
                    cases.len(),
                    results.len()
                )))
            }
        });

        if let Err(err) = &outcome {
            metrics::counter!("code_runner_failures_total").increment(1);
            tracing::warn!(
                language = %language,
                cases = cases.len(),
                error = %err,
                "Code runner batch failed"
            );
        }

        outcome
    }
}

fn check_submission(
    problem: &CodingProblem,
    language: &str,
    source_code: &str,
) -> Result<Language, String> {
    if source_code.trim().is_empty() {
        return Err(NO_SUBMISSION.to_string());
    }

    match Language::parse(language) {
        Some(parsed) if problem.allows(parsed) => Ok(parsed),
        _ => {
            let allowed: Vec<&str> = problem.languages.iter().map(|lang| lang.as_str()).collect();
            Err(format!("Language not allowed. Allowed: {}", allowed.join(", ")))
        }
    }
}

fn sample_results(
    samples: &[&TestCase],
    outcome: Result<Vec<RunnerCaseResult>, RunnerError>,
) -> Vec<SampleResult> {
    match outcome {
        Ok(results) => samples
            .iter()
            .zip(results)
            .map(|(case, result)| SampleResult {
                input: case.input.clone(),
                expected_output: case.output.clone(),
                actual_output: result.actual_output,
                passed: result.passed,
                runtime_ms: result.runtime_ms,
                error: result.error,
            })
            .collect(),
        Err(err) => failed_samples(samples, &err.to_string()),
    }
}

fn failed_samples(samples: &[&TestCase], reason: &str) -> Vec<SampleResult> {
    samples
        .iter()
        .map(|case| SampleResult {
            input: case.input.clone(),
            expected_output: case.output.clone(),
            actual_output: String::new(),
            passed: false,
            runtime_ms: None,
            error: reason.to_string(),
        })
        .collect()
}

fn hidden_summary(
    hidden: &[&TestCase],
    outcome: Result<Vec<RunnerCaseResult>, RunnerError>,
) -> HiddenSummary {
    let passed = match outcome {
        Ok(results) => count(results.iter().filter(|result| result.passed).count()),
        Err(_) => 0,
    };
    HiddenSummary { total: count(hidden.len()), passed }
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
