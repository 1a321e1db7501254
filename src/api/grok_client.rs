// src/api/grok_client.rs
//
// Retry/backoff wrapper around the Grok chat-completion API
// (https://api.x.ai). Authorization: Bearer token.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_GROK_API_BASE: &str = "https://api.x.ai";
const COMPLETION_PATH: &str = "/v1/chat/completions";

/// Returned when the model answers with an empty content string. An empty
/// completion is not an error; the caller gets this text instead.
pub const EMPTY_COMPLETION_PLACEHOLDER: &str =
    "No specific response generated; please try again.";

/// The three decode failures stay separate so callers can react differently:
/// an upstream status carries the remote status, a non-JSON body carries the
/// raw body, and well-formed JSON missing the message-content path carries
/// the body too but is its own kind.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("completion API error: {status} - {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response format from completion API: {reason}; body={body}")]
    InvalidJson { reason: String, body: String },

    #[error("completion response missing message content; body={body}")]
    MissingContent { body: String },
}

/// Per-invocation retry parameters. Only client-side timeouts are retried;
/// attempt `n` waits `base_delay * n` before attempt `n + 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: i32,
    #[serde(default)]
    pub completion_tokens: i32,
}

#[derive(Debug)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
    /// How many attempts the invocation took, 1-indexed.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct GrokClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl GrokClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            policy,
        }
    }

    /// One logical completion call. Attempts run strictly sequentially, each
    /// bounded by the policy timeout; a timed-out attempt is retried after
    /// backoff while attempts remain, anything else fails the invocation.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, CompletionError> {
        let mut attempt: u32 = 1;
        loop {
            let started = Instant::now();
            match self.attempt(request).await {
                Ok((content, usage)) => {
                    log::info!(
                        "grok completion ok attempt={} elapsed_ms={}",
                        attempt,
                        started.elapsed().as_millis()
                    );
                    return Ok(Completion {
                        content,
                        usage,
                        attempts: attempt,
                    });
                }
                Err(e) if is_attempt_timeout(&e) => {
                    if attempt >= self.policy.max_attempts {
                        log::error!(
                            "grok completion timed out attempt={} elapsed_ms={}, giving up",
                            attempt,
                            started.elapsed().as_millis()
                        );
                        return Err(CompletionError::Timeout { attempts: attempt });
                    }
                    let delay = self.policy.base_delay * attempt;
                    log::warn!(
                        "grok completion timed out attempt={} elapsed_ms={} retry_in_ms={}",
                        attempt,
                        started.elapsed().as_millis(),
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!(
                        "grok completion failed attempt={} elapsed_ms={}: {e}",
                        attempt,
                        started.elapsed().as_millis()
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &ChatRequest,
    ) -> Result<(String, TokenUsage), CompletionError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, COMPLETION_PATH))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.policy.attempt_timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(CompletionError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = serde_json::from_str(&body).map_err(|e| CompletionError::InvalidJson {
            reason: e.to_string(),
            body: body.clone(),
        })?;

        let content = match json.pointer("/choices/0/message/content") {
            Some(Value::String(s)) => s.clone(),
            _ => return Err(CompletionError::MissingContent { body }),
        };

        let usage = json
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok())
            .unwrap_or_default();

        let content = if content.is_empty() {
            EMPTY_COMPLETION_PLACEHOLDER.to_string()
        } else {
            content
        };

        Ok((content, usage))
    }
}

fn is_attempt_timeout(err: &CompletionError) -> bool {
    matches!(err, CompletionError::Transport(e) if e.is_timeout())
}
