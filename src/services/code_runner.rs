//! Client for the sandboxed code runner service.
//!
//! The runner executes one source file against a batch of inputs and answers with one
//! result per input, in order. Anything else is treated as a failed batch.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::RunnerSettings;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RunnerCase {
    pub(crate) input: String,
    pub(crate) output: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RunBatch {
    pub(crate) language: String,
    pub(crate) source_code: String,
    pub(crate) testcases: Vec<RunnerCase>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunnerCaseResult {
    #[serde(default)]
    pub(crate) actual_output: String,
    #[serde(default)]
    pub(crate) passed: bool,
    #[serde(default)]
    pub(crate) runtime_ms: Option<u64>,
    #[serde(default)]
    pub(crate) error: String,
}

#[derive(Debug, Error)]
pub(crate) enum RunnerError {
    #[error("code runner is not configured")]
    NotConfigured,
    #[error("code runner unreachable: {0}")]
    Unreachable(String),
    #[error("code runner timed out after {0} ms")]
    Timeout(u64),
    #[error("code runner rejected the batch: {0}")]
    Rejected(String),
    #[error("code runner returned a malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub(crate) trait CodeRunner: Send + Sync {
    async fn run(&self, batch: RunBatch) -> Result<Vec<RunnerCaseResult>, RunnerError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequestBody<'a> {
    language: &'a str,
    source_code: &'a str,
    testcases: &'a [RunnerCase],
    timeout_ms: u64,
    max_output_chars: u64,
}

#[derive(Deserialize)]
struct RunResponseBody {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    results: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpCodeRunner {
    client: Client,
    base_url: Option<String>,
    secret: String,
    timeout_ms: u64,
    max_output_chars: u64,
}

impl HttpCodeRunner {
    pub(crate) fn from_settings(settings: &RunnerSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(settings.batch_timeout_ms))
            .build()
            .context("Failed to build code runner HTTP client")?;

        let base_url = settings
            .is_configured()
            .then(|| settings.base_url.trim_end_matches('/').to_string());
        if base_url.is_none() {
            tracing::warn!("RUNNER_BASE_URL/RUNNER_SECRET not set; coding cases will fail");
        }

        Ok(Self {
            client,
            base_url,
            secret: settings.secret.clone(),
            timeout_ms: settings.timeout_ms,
            max_output_chars: settings.max_output_chars,
        })
    }
}

#[async_trait]
impl CodeRunner for HttpCodeRunner {
    async fn run(&self, batch: RunBatch) -> Result<Vec<RunnerCaseResult>, RunnerError> {
        let base_url = self.base_url.as_deref().ok_or(RunnerError::NotConfigured)?;
        let url = format!("{base_url}/run");

        let body = RunRequestBody {
            language: &batch.language,
            source_code: &batch.source_code,
            testcases: &batch.testcases,
            timeout_ms: self.timeout_ms,
            max_output_chars: self.max_output_chars,
        };

        let response = self
            .client
            .post(&url)
            .header("X-RUNNER-SECRET", &self.secret)
            .json(&body)
            .send()
            .await
            .map_err(|err| RunnerError::Unreachable(err.to_string()))?;

        let status = response.status();
        let payload: RunResponseBody = response
            .json()
            .await
            .map_err(|err| RunnerError::Malformed(err.to_string()))?;

        if !status.is_success() || !payload.ok {
            let reason = payload.error.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(RunnerError::Rejected(reason));
        }

        parse_results(payload.results, batch.testcases.len())
    }
}

fn parse_results(
    results: Option<serde_json::Value>,
    expected: usize,
) -> Result<Vec<RunnerCaseResult>, RunnerError> {
    let results = match results {
        Some(value @ serde_json::Value::Array(_)) => value,
        _ => return Err(RunnerError::Malformed("results is not an array".to_string())),
    };

    let parsed: Vec<RunnerCaseResult> =
        serde_json::from_value(results).map_err(|err| RunnerError::Malformed(err.to_string()))?;

    if parsed.len() != expected {
        return Err(RunnerError::Malformed(format!(
            "expected {expected} results, got {}",
            parsed.len()
        )));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_results_reads_camel_case_entries() {
        let results = json!([
            {"actualOutput": "3", "passed": true, "runtimeMs": 12, "error": ""},
            {"actualOutput": "", "passed": false, "error": "Timeout"}
        ]);

        let parsed = parse_results(Some(results), 2).expect("results");
        assert_eq!(parsed[0].actual_output, "3");
        assert!(parsed[0].passed);
        assert_eq!(parsed[0].runtime_ms, Some(12));
        assert_eq!(parsed[1].error, "Timeout");
        assert_eq!(parsed[1].runtime_ms, None);
    }

    #[test]
    fn parse_results_rejects_non_array_and_count_mismatch() {
        assert!(matches!(
            parse_results(Some(json!({"actualOutput": "1"})), 1),
            Err(RunnerError::Malformed(_))
        ));
        assert!(matches!(parse_results(None, 1), Err(RunnerError::Malformed(_))));
        assert!(matches!(
            parse_results(Some(json!([{"actualOutput": "1", "passed": true}])), 2),
            Err(RunnerError::Malformed(_))
        ));
    }

    #[test]
    fn request_body_uses_runner_field_names() {
        let cases = vec![RunnerCase { input: "1 2".into(), output: "3".into() }];
        let body = RunRequestBody {
            language: "python",
            source_code: "print(3)",
            testcases: &cases,
            timeout_ms: 2000,
            max_output_chars: 20000,
        };

        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["sourceCode"], "print(3)");
        assert_eq!(value["timeoutMs"], 2000);
        assert_eq!(value["maxOutputChars"], 20000);
        assert_eq!(value["testcases"][0]["input"], "1 2");
    }

    #[tokio::test]
    async fn unconfigured_runner_reports_not_configured() {
        let settings = RunnerSettings {
            base_url: String::new(),
            secret: String::new(),
            timeout_ms: 2000,
            max_output_chars: 20000,
            batch_timeout_ms: 10000,
        };
        let runner = HttpCodeRunner::from_settings(&settings).expect("runner");
        let batch = RunBatch {
            language: "python".into(),
            source_code: "print(1)".into(),
            testcases: Vec::new(),
        };

        assert!(matches!(runner.run(batch).await, Err(RunnerError::NotConfigured)));
    }
}
