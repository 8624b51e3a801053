//! OpenAI-compatible chat-completions oracle adapter.
//!
//! Each query becomes one non-streamed request:
//!
//! ```text
//! POST {base_url}/chat/completions
//! Authorization: Bearer <key>
//! { "model": "gpt-4o",
//!   "messages": [ {"role":"system","content":"You are a helpful assistant."},
//!                 {"role":"user","content":"<prompt>"} ],
//!   "max_tokens": 10, "temperature": 0.1 }
//! ```
//!
//! The reply text is `choices[0].message.content`.
//!
//! # Error Classification
//!
//! - reqwest timeout → [`OracleError::Timeout`]
//! - connect / DNS / TLS / body errors → [`OracleError::Transport`]
//! - non-2xx status → [`OracleError::HttpStatus`]
//! - undecodable body or missing content → [`OracleError::MalformedReply`]
//!
//! No retries: a failed check fails closed and the next flow asks again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Oracle, OracleError, OracleQuery};
use crate::config::OracleConfig;

/// System message sent ahead of every query.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Configuration for the chat-completions client.
#[derive(Clone)]
pub struct OracleClientConfig {
    /// API base, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Bearer token. `None` sends no Authorization header.
    pub api_key: Option<String>,
    /// Per-request timeout (connect + response).
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for OracleClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClientConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for OracleClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl OracleClientConfig {
    /// Builds client settings from the `oracle` config section, reading the
    /// API key from the environment variable it names.
    pub fn from_oracle_config(config: &OracleConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "Oracle API key not set; requests will be sent without authorization"
            );
        }
        Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout,
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Oracle backed by an OpenAI-compatible chat-completions endpoint.
///
/// `Clone` and cheap to share; reqwest pools connections internally.
#[derive(Clone)]
pub struct ChatCompletionsOracle {
    client: Client,
    config: OracleClientConfig,
    /// Pre-computed endpoint URL.
    completions_url: String,
}

impl ChatCompletionsOracle {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Config`] if the base URL is empty or not an
    /// absolute URL, or if the HTTP client cannot be built.
    pub fn new(config: OracleClientConfig) -> Result<Self, OracleError> {
        if config.base_url.is_empty() {
            return Err(OracleError::Config {
                reason: "base_url is empty".to_string(),
            });
        }
        if let Err(e) = reqwest::Url::parse(&config.base_url) {
            return Err(OracleError::Config {
                reason: format!("invalid base_url '{}': {}", config.base_url, e),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| OracleError::Config {
                reason: format!("http client build error: {}", e),
            })?;

        let completions_url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            completions_url,
        })
    }

    fn classify_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else {
            OracleError::Transport {
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Oracle for ChatCompletionsOracle {
    #[tracing::instrument(skip(self, query), fields(check = %query.check, model = %self.config.model))]
    async fn submit(&self, query: &OracleQuery) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &query.prompt,
                },
            ],
            max_tokens: query.max_tokens,
            temperature: query.temperature,
        };

        let start = Instant::now();
        let mut request = self.client.post(&self.completions_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.classify_error(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Oracle returned error status");
            return Err(OracleError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify_error(e))?;
        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|e| OracleError::MalformedReply {
                reason: e.to_string(),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::MalformedReply {
                reason: "reply has no choices[0].message.content".to_string(),
            })?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            reply_len = content.len(),
            "Oracle replied"
        );
        Ok(content.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "chat_completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::CheckKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn query() -> OracleQuery {
        OracleQuery {
            check: CheckKind::Alignment,
            prompt: "Is this aligned?".to_string(),
            max_tokens: 10,
            temperature: 0.1,
        }
    }

    fn oracle_for(server: &MockServer, timeout: Duration) -> ChatCompletionsOracle {
        ChatCompletionsOracle::new(OracleClientConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: Some("sk-test".to_string()),
            timeout,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_chat_request_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "max_tokens": 10,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": "Is this aligned?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": " True\n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Duration::from_secs(5));
        assert_eq!(oracle.submit(&query()).await.unwrap(), "True");
    }

    #[tokio::test]
    async fn test_http_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Duration::from_secs(5));
        assert_eq!(
            oracle.submit(&query()).await.unwrap_err(),
            OracleError::HttpStatus { status: 429 }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Duration::from_secs(5));
        let err = oracle.submit(&query()).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_reply");
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Duration::from_secs(5));
        let err = oracle.submit(&query()).await.unwrap_err();
        assert!(matches!(err, OracleError::MalformedReply { .. }));
    }

    #[tokio::test]
    async fn test_slow_reply_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "True"}}]}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let oracle = oracle_for(&server, Duration::from_millis(200));
        assert_eq!(
            oracle.submit(&query()).await.unwrap_err(),
            OracleError::Timeout { timeout_ms: 200 }
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let oracle = ChatCompletionsOracle::new(OracleClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let err = oracle.submit(&query()).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = ChatCompletionsOracle::new(OracleClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, OracleError::Config { .. }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = OracleClientConfig {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
