//! The long-polling worker: consumes updates exactly once, drives the
//! clarification dialogue and persists the acknowledged offset.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use compass_planning::intent::{self, Intent};
use compass_planning::machine::{self, SessionSnapshot};
use compass_planning::replies::{
    REPLY_HELP, REPLY_NON_TEXT, REPLY_SESSION_TIMEOUT, REPLY_START, REPLY_START_BACK,
    REPLY_UNKNOWN_COMMAND,
};
use compass_planning::Command;
use compass_store::types::{ConversationTurn, Goal, TurnRole, User};
use compass_store::{Store, StoreError};

use crate::client::{BotClient, ClientError};
use crate::dto::{incoming_from_update, GetUpdatesParams, IncomingMessage, OutgoingMessage, Update};
use crate::metrics::PollingMetrics;
use crate::sender::{SendError, Sender};
use crate::util::{mask_chat_id, sleep_with_cancel};

const POLL_FAILURE_BACKOFF_BASE: Duration = Duration::from_millis(500);
const POLL_FAILURE_BACKOFF_MAX: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_timeout_sec: i64,
    pub poll_interval: Duration,
    pub allowed_updates: Vec<String>,
}

/// Errors that end the polling loop. Everything else is logged and skipped.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("startup getMe failed: {0}")]
    Startup(#[source] ClientError),

    #[error("load last update id failed: {0}")]
    LoadOffset(#[source] StoreError),

    /// Losing the offset would silently reprocess updates after a restart,
    /// so a failed save is fatal.
    #[error("persist last update id failed: {0}")]
    SaveOffset(#[source] StoreError),
}

/// Per-update handling failures; these never stop the loop.
#[derive(Debug, Error)]
enum HandleError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Send(#[from] SendError),
}

pub struct Worker {
    client: Arc<dyn BotClient>,
    store: Arc<dyn Store>,
    sender: Sender,
    poll_timeout_sec: i64,
    poll_interval: Duration,
    allowed_updates: Vec<String>,
    metrics: PollingMetrics,
}

impl Worker {
    pub fn new(cfg: WorkerConfig, client: Arc<dyn BotClient>, store: Arc<dyn Store>) -> Self {
        Self {
            sender: Sender::new(client.clone()),
            client,
            store,
            poll_timeout_sec: cfg.poll_timeout_sec,
            poll_interval: cfg.poll_interval,
            allowed_updates: cfg.allowed_updates,
            metrics: PollingMetrics::new(),
        }
    }

    /// Poll until the token is cancelled. Returns an error only for the
    /// fatal conditions in [`WorkerError`].
    pub async fn run(&self, token: CancellationToken) -> Result<(), WorkerError> {
        let me = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            result = self.client.get_me() => result.map_err(WorkerError::Startup)?,
        };
        info!(bot_id = me.id, bot_username = %me.username, "telegram bot verified");

        let mut last_update_id = self
            .store
            .load_last_update_id()
            .map_err(WorkerError::LoadOffset)?;
        info!(
            last_update_id,
            poll_timeout_sec = self.poll_timeout_sec,
            "telegram polling worker started"
        );

        let mut failure_streak: u32 = 0;
        loop {
            if token.is_cancelled() {
                info!("telegram polling worker stopped");
                return Ok(());
            }

            let params = GetUpdatesParams {
                offset: last_update_id + 1,
                timeout_sec: self.poll_timeout_sec,
                allowed_updates: self.allowed_updates.clone(),
            };
            let result = tokio::select! {
                _ = token.cancelled() => {
                    info!("telegram polling worker stopped");
                    return Ok(());
                }
                result = self.client.get_updates(params) => result,
            };

            let updates = match result {
                Ok(updates) => updates,
                Err(err) => {
                    failure_streak += 1;
                    let (success_count, failure_count) = self.metrics.record_failure();
                    let backoff = polling_failure_backoff(failure_streak);
                    warn!(
                        failure_streak,
                        backoff_ms = backoff.as_millis() as u64,
                        polling_success_count = success_count,
                        polling_failure_count = failure_count,
                        error = %err,
                        "polling_cycle_failed"
                    );

                    if !sleep_with_cancel(&token, backoff).await {
                        info!("telegram polling worker stopped");
                        return Ok(());
                    }
                    continue;
                }
            };

            failure_streak = 0;
            let (success_count, failure_count) = self.metrics.record_success();
            info!(
                updates_count = updates.len(),
                polling_success_count = success_count,
                polling_failure_count = failure_count,
                "polling_cycle_succeeded"
            );

            if updates.is_empty() {
                if !sleep_with_cancel(&token, self.poll_interval).await {
                    info!("telegram polling worker stopped");
                    return Ok(());
                }
                continue;
            }

            for update in updates {
                let update_id = update.update_id;
                if let Err(err) = self.handle_update(&token, update).await {
                    error!(update_id, error = %err, "handle telegram update failed");
                }

                // Best-effort-after-handling: the offset advances even when
                // handling failed, so a poison update cannot stall the loop.
                if update_id > last_update_id {
                    self.store
                        .save_last_update_id(update_id)
                        .map_err(WorkerError::SaveOffset)?;
                    last_update_id = update_id;
                }
            }
        }
    }

    async fn handle_update(
        &self,
        token: &CancellationToken,
        update: Update,
    ) -> Result<(), HandleError> {
        let Some(message) = incoming_from_update(&update) else {
            info!(update_id = update.update_id, "skip non-message update");
            return Ok(());
        };

        let chat_id_masked = mask_chat_id(message.chat_id);
        info!(
            update_id = message.update_id,
            chat_id_masked = %chat_id_masked,
            "telegram_update_received"
        );

        let is_new = self
            .store
            .mark_message_dedup(message.update_id, message.chat_id)?;
        if !is_new {
            info!(
                update_id = message.update_id,
                chat_id_masked = %chat_id_masked,
                "duplicate_message_skipped"
            );
            return Ok(());
        }

        if message.text.trim().is_empty() {
            return self.reply_to(token, &message, REPLY_NON_TEXT.to_string()).await;
        }

        let (user, is_new_user) = self.store.find_or_create_user(message.chat_id)?;
        if is_new_user {
            info!(user_id = %user.id, chat_id_masked = %chat_id_masked, "user_created");
        }

        let reply = match Command::parse(&message.text) {
            Some(command) => match command.name.as_str() {
                "start" => {
                    if is_new_user {
                        REPLY_START.to_string()
                    } else {
                        REPLY_START_BACK.to_string()
                    }
                }
                "help" => REPLY_HELP.to_string(),
                // /goal and /confirm are dialogue moves, not meta commands.
                "goal" | "confirm" => self.clarify_round(&user, &message)?,
                _ => REPLY_UNKNOWN_COMMAND.to_string(),
            },
            None => self.clarify_round(&user, &message)?,
        };

        self.reply_to(token, &message, reply).await
    }

    /// One turn of the clarification dialogue: resolve the goal and session,
    /// apply the timeout protocol, route the intent, run the state machine
    /// and persist the outcome. Returns the reply text.
    fn clarify_round(&self, user: &User, message: &IncomingMessage) -> Result<String, HandleError> {
        let goal = self.ensure_active_goal(user)?;
        let (session, _) = self.store.get_or_create_planning_session(&goal.id)?;

        let mut snapshot = SessionSnapshot {
            state: session.state,
            slots: session.slots,
            turn_count: session.turn_count,
            last_intent: session.last_intent.as_deref().and_then(Intent::parse),
        };

        let now = Utc::now();
        let mut timed_out = false;
        if machine::is_timed_out(session.updated_at, now, session.state) {
            snapshot = machine::timeout_reset(&snapshot);
            let mut reset = session.clone();
            reset.state = snapshot.state;
            reset.slots = snapshot.slots;
            reset.turn_count = snapshot.turn_count;
            reset.last_intent = None;
            self.store.update_planning_session(&reset)?;
            timed_out = true;
            info!(session_id = %session.id, "planning_session_timeout_reset");
        }

        let intent = intent::route(&message.text, snapshot.state);

        let turn_count = self.store.increment_planning_session_turn(&session.id)?;
        snapshot.turn_count = turn_count;

        self.store.save_conversation_turn(ConversationTurn {
            session_id: session.id.clone(),
            role: TurnRole::User,
            content: message.text.clone(),
            intent: Some(intent.intent.as_str().to_string()),
            intent_confidence: Some(intent.confidence),
            created_at: now,
        })?;

        let outcome = machine::advance(&snapshot, &message.text, intent);

        let reply = if timed_out {
            format!("{REPLY_SESSION_TIMEOUT}\n\n{}", outcome.reply)
        } else {
            outcome.reply
        };

        let mut updated = session.clone();
        updated.state = outcome.session.state;
        updated.slots = outcome.session.slots;
        updated.turn_count = outcome.session.turn_count;
        updated.last_intent = outcome
            .session
            .last_intent
            .map(|tag| tag.as_str().to_string());
        self.store.update_planning_session(&updated)?;

        self.store.save_conversation_turn(ConversationTurn {
            session_id: session.id.clone(),
            role: TurnRole::Assistant,
            content: reply.clone(),
            intent: Some(intent.intent.as_str().to_string()),
            intent_confidence: None,
            created_at: Utc::now(),
        })?;

        Ok(reply)
    }

    fn ensure_active_goal(&self, user: &User) -> Result<Goal, HandleError> {
        if let Some(goal) = self.store.get_active_goal(&user.id)? {
            return Ok(goal);
        }

        let goal = self.store.create_goal_draft(&user.id)?;
        info!(goal_id = %goal.id, user_id = %user.id, "goal_started");
        Ok(goal)
    }

    async fn reply_to(
        &self,
        token: &CancellationToken,
        message: &IncomingMessage,
        text: String,
    ) -> Result<(), HandleError> {
        self.sender
            .send(
                token,
                &OutgoingMessage {
                    chat_id: message.chat_id,
                    text,
                    reply_to_message_id: Some(message.message_id),
                },
            )
            .await?;
        Ok(())
    }
}

fn polling_failure_backoff(failure_streak: u32) -> Duration {
    let mut backoff = POLL_FAILURE_BACKOFF_BASE;
    for _ in 1..failure_streak {
        backoff *= 2;
        if backoff >= POLL_FAILURE_BACKOFF_MAX {
            return POLL_FAILURE_BACKOFF_MAX;
        }
    }
    backoff
}
