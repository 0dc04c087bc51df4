//! HTTP submission client built on reqwest.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{SubmissionClient, SubmissionError};

const ERROR_BODY_LIMIT: usize = 500;

/// POSTs each payload as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubmissionClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpSubmissionClient {
    /// Client for `base_url` + `endpoint` with a per-request timeout.
    pub fn new(base_url: &str, endpoint: &str, timeout: Duration) -> Result<Self, SubmissionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: join_url(base_url, endpoint),
            timeout,
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(&self, payload: &Value) -> Result<Value, SubmissionError> {
        tracing::info!("calling API: {}", self.url);
        let response = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = response.status();
        tracing::info!("API response status: {}", status.as_u16());
        let body = response.text().await.map_err(|e| self.classify(&e))?;

        if !status.is_success() {
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::error!("API returned error status {}: {}", status.as_u16(), body);
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| SubmissionError::InvalidResponse(e.to_string()))
    }
}

impl HttpSubmissionClient {
    fn classify(&self, err: &reqwest::Error) -> SubmissionError {
        if err.is_timeout() {
            SubmissionError::Timeout(self.timeout)
        } else {
            SubmissionError::Transport(err.to_string())
        }
    }
}

fn join_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.is_empty() {
        return base_url.trim_end_matches('/').to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
