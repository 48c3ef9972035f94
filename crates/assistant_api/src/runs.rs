use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::payload::{RunInput, RunRequest};
use crate::transport::ApiRequest;
use crate::url::{RUNS_FEEDBACK_PATH, RUNS_PATH};

const CREATE_FALLBACK: &str = "Failed to create run";
const FEEDBACK_FALLBACK: &str = "Failed to send feedback";

/// A rating attached to a finished run.
///
/// `score` and `value` are free-form on the server; unset fields are left
/// out of the body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFeedback {
    pub run_id: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RunFeedback {
    pub fn new(run_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            score: None,
            value: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Non-streaming run endpoints.
#[derive(Debug, Clone)]
pub struct RunClient {
    gateway: Arc<Gateway>,
}

impl RunClient {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Start a run in the background. Its output is read later through the
    /// thread, not returned here.
    pub async fn create_run(
        &self,
        input: RunInput,
        thread_id: &str,
        config: Value,
    ) -> Result<(), ApiError> {
        let (run, _) = RunRequest::prepare(input, thread_id, config)?;
        let request = ApiRequest::post(RUNS_PATH).json(serde_json::to_value(run)?);

        let response = self.gateway.request(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, CREATE_FALLBACK).await);
        }
        info!(thread_id, "run created");
        Ok(())
    }

    pub async fn feedback(&self, feedback: &RunFeedback) -> Result<(), ApiError> {
        if feedback.run_id.trim().is_empty() || feedback.key.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "feedback needs a run id and a key".to_owned(),
            ));
        }

        let request = ApiRequest::post(RUNS_FEEDBACK_PATH).json(serde_json::to_value(feedback)?);
        let response = self.gateway.request(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(response, FEEDBACK_FALLBACK).await);
        }
        info!(run_id = %feedback.run_id, key = %feedback.key, "feedback sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::RunFeedback;

    #[test]
    fn unset_feedback_fields_are_omitted() {
        let minimal = serde_json::to_value(RunFeedback::new("r1", "helpful")).expect("encode");
        assert_eq!(minimal, json!({"run_id": "r1", "key": "helpful"}));

        let full = RunFeedback::new("r1", "helpful")
            .with_score(1.0)
            .with_value(json!({"reason": "clear"}))
            .with_comment("thanks");
        let encoded = serde_json::to_value(full).expect("encode");
        assert_eq!(encoded["score"], json!(1.0));
        assert_eq!(encoded["value"]["reason"], "clear");
        assert_eq!(encoded["comment"], "thanks");
    }
}
