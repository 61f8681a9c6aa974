//! Outbound sending with bounded, classified retries.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::{BotClient, ClientError};
use crate::dto::OutgoingMessage;
use crate::util::sleep_with_cancel;

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SendError {
    /// Retries exhausted or the error was not retryable; carries the final
    /// client error unchanged.
    #[error("send message failed: {0}")]
    Client(#[source] ClientError),

    /// The cancellation token fired while sending or waiting to retry.
    #[error("send cancelled")]
    Cancelled,
}

pub struct Sender {
    client: Arc<dyn BotClient>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Sender {
    pub fn new(client: Arc<dyn BotClient>) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Send `message`, retrying up to `max_retries` times.
    ///
    /// Rate limits wait the server-advised interval; 5xx and transport
    /// errors wait the current exponential backoff; other API errors stop
    /// immediately.
    pub async fn send(
        &self,
        token: &CancellationToken,
        message: &OutgoingMessage,
    ) -> Result<(), SendError> {
        let mut delay = self.base_delay;
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                _ = token.cancelled() => return Err(SendError::Cancelled),
                result = self.client.send_message(message) => result,
            };

            let err = match result {
                Ok(_) => return Ok(()),
                Err(err) => err,
            };

            let wait = match retry_decision(&err, delay) {
                Some(wait) if attempt < self.max_retries => wait,
                _ => return Err(SendError::Client(err)),
            };

            warn!(
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "telegram send retry"
            );

            if !sleep_with_cancel(token, wait).await {
                return Err(SendError::Cancelled);
            }

            delay = (delay * 2).min(self.max_delay);
            attempt += 1;
        }
    }
}

/// `Some(wait)` when the error is worth another attempt.
fn retry_decision(err: &ClientError, fallback: Duration) -> Option<Duration> {
    if let Some(wait) = err.rate_limit_hint() {
        return Some(wait);
    }

    match err {
        ClientError::Api(api) if api.status_code >= 500 => Some(fallback),
        ClientError::Api(_) => None,
        // Transport failures and anything unclassified get the backoff.
        _ => Some(fallback),
    }
}
