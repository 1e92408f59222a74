//! HTTP scoring oracle against a chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{build_answer_block, OracleError, ScoringOracle};

/// Oracle backed by an OpenAI-compatible chat-completions API.
pub struct HttpOracle {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl HttpOracle {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
            max_tokens,
            request_timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ScoringOracle for HttpOracle {
    async fn evaluate(&self, prompt: &str, answer: &str) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt },
                { "role": "user", "content": build_answer_block(answer) },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        seconds: self.request_timeout.as_secs(),
                    }
                } else {
                    OracleError::Transport(e)
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OracleError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let payload: serde_json::Value = resp.json().await?;
        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(OracleError::EmptyResponse)?;

        Ok(text.to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
