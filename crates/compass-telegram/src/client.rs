//! Typed client for the three Bot API methods the worker uses.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::dto::{ApiEnvelope, BotIdentity, GetUpdatesParams, Message, OutgoingMessage, Update};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Must exceed the long-poll timeout (50 s) with margin, or the client
/// aborts a poll the server is still holding open.
const HTTP_TIMEOUT: Duration = Duration::from_secs(70);

/// A non-OK Bot API envelope, or an HTTP error status without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status_code: u16,
    pub error_code: Option<i64>,
    pub description: String,
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.error_code.unwrap_or(0);
        if self.description.is_empty() {
            write!(
                f,
                "telegram api error (status={}, code={})",
                self.status_code, code
            )
        } else {
            write!(
                f,
                "telegram api error (status={}, code={}): {}",
                self.status_code, code, self.description
            )
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("telegram {method} request: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("decode telegram {method} response: {reason}")]
    Decode {
        method: &'static str,
        reason: String,
    },

    #[error("build telegram http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    /// `Some(wait)` when this error is an HTTP 429. An absent or
    /// non-positive `retry_after` defaults to one second.
    pub fn rate_limit_hint(&self) -> Option<Duration> {
        match self {
            ClientError::Api(api) if api.status_code == 429 => Some(
                api.retry_after
                    .filter(|wait| !wait.is_zero())
                    .unwrap_or(Duration::from_secs(1)),
            ),
            _ => None,
        }
    }
}

/// The platform operations the worker and sender depend on.
#[async_trait]
pub trait BotClient: Send + Sync {
    async fn get_me(&self) -> Result<BotIdentity, ClientError>;
    async fn get_updates(&self, params: GetUpdatesParams) -> Result<Vec<Update>, ClientError>;
    async fn send_message(&self, message: &OutgoingMessage) -> Result<Message, ClientError>;
}

pub struct HttpBotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBotClient {
    pub fn new(token: &str) -> Result<Self, ClientError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        let base_url = base_url.trim().trim_end_matches('/');
        Ok(Self {
            http,
            base_url: if base_url.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                base_url.to_string()
            },
            token: token.trim().to_string(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        payload: &serde_json::Value,
    ) -> Result<T, ClientError> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|source| ClientError::Transport { method, source })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Transport { method, source })?;

        decode_envelope(method, status, &body)
    }
}

#[async_trait]
impl BotClient for HttpBotClient {
    async fn get_me(&self) -> Result<BotIdentity, ClientError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    async fn get_updates(&self, params: GetUpdatesParams) -> Result<Vec<Update>, ClientError> {
        let mut payload = serde_json::json!({ "timeout": params.timeout_sec });
        if params.offset > 0 {
            payload["offset"] = serde_json::json!(params.offset);
        }
        if !params.allowed_updates.is_empty() {
            payload["allowed_updates"] = serde_json::json!(params.allowed_updates);
        }
        self.call("getUpdates", &payload).await
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<Message, ClientError> {
        let mut payload = serde_json::json!({
            "chat_id": message.chat_id,
            "text": message.text,
        });
        if let Some(reply_to) = message.reply_to_message_id {
            payload["reply_to_message_id"] = serde_json::json!(reply_to);
        }
        self.call("sendMessage", &payload).await
    }
}

/// Translate one HTTP response into the method result or an [`ApiError`].
///
/// An error status whose body is not a parseable envelope still yields an
/// `ApiError` carrying the status code and the raw body as description.
fn decode_envelope<T: DeserializeOwned>(
    method: &'static str,
    status: u16,
    body: &[u8],
) -> Result<T, ClientError> {
    let envelope: ApiEnvelope<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) => {
            if status >= 400 {
                return Err(ApiError {
                    status_code: status,
                    error_code: None,
                    description: String::from_utf8_lossy(body).trim().to_string(),
                    retry_after: None,
                }
                .into());
            }
            return Err(ClientError::Decode {
                method,
                reason: err.to_string(),
            });
        }
    };

    if !envelope.ok {
        return Err(ApiError {
            status_code: status,
            error_code: envelope.error_code,
            description: envelope.description.unwrap_or_default(),
            retry_after: envelope
                .parameters
                .and_then(|params| params.retry_after)
                .filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs as u64)),
        }
        .into());
    }

    envelope.result.ok_or_else(|| ClientError::Decode {
        method,
        reason: "envelope ok but result missing".to_string(),
    })
}
