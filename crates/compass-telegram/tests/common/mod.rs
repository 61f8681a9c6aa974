//! Shared harness for the worker tests: a scripted platform client and a
//! runner that drives the worker until it has sent a given number of
//! messages.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use compass_store::Store;
use compass_telegram::client::{BotClient, ClientError};
use compass_telegram::dto::{
    BotIdentity, Chat, GetUpdatesParams, Message, OutgoingMessage, Update,
};
use compass_telegram::{Worker, WorkerConfig, WorkerError};

#[derive(Default)]
struct ScriptedState {
    batches: VecDeque<Vec<Update>>,
    offsets: Vec<i64>,
    sent: Vec<OutgoingMessage>,
}

/// Serves pre-scripted update batches, then blocks like an idle long poll.
#[derive(Default)]
pub struct ScriptedClient {
    state: Mutex<ScriptedState>,
}

impl ScriptedClient {
    pub fn with_batches(batches: Vec<Vec<Update>>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState {
                batches: batches.into(),
                ..ScriptedState::default()
            }),
        })
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.state.lock().unwrap().offsets.clone()
    }
}

#[async_trait]
impl BotClient for ScriptedClient {
    async fn get_me(&self) -> Result<BotIdentity, ClientError> {
        Ok(BotIdentity {
            id: 1,
            is_bot: true,
            first_name: "Compass".into(),
            username: "compass_test_bot".into(),
        })
    }

    async fn get_updates(&self, params: GetUpdatesParams) -> Result<Vec<Update>, ClientError> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.offsets.push(params.offset);
            state.batches.pop_front()
        };

        match batch {
            Some(batch) => Ok(batch),
            None => {
                // Script exhausted — emulate a held-open long poll. The
                // worker's cancellation select drops this future on shutdown.
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<Message, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(message.clone());
        Ok(Message {
            message_id: 0,
            chat: Chat {
                id: message.chat_id,
                kind: "private".into(),
            },
            text: message.text.clone(),
        })
    }
}

pub fn text_update(update_id: i64, message_id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        update_id,
        message: Some(Message {
            message_id,
            chat: Chat {
                id: chat_id,
                kind: "private".into(),
            },
            text: text.into(),
        }),
    }
}

/// Run the worker until `send_count` messages have gone out, then cancel it
/// and return its exit result. Panics after two seconds of no progress.
pub async fn run_worker_until_send_count(
    client: Arc<ScriptedClient>,
    store: Arc<dyn Store>,
    send_count: usize,
) -> Result<(), WorkerError> {
    let probe = client.clone();
    run_worker_until(client, store, move || probe.send_count() >= send_count).await
}

/// Run the worker until `done` reports true, then cancel it and return its
/// exit result. Panics after two seconds of no progress.
pub async fn run_worker_until(
    client: Arc<ScriptedClient>,
    store: Arc<dyn Store>,
    done: impl Fn() -> bool,
) -> Result<(), WorkerError> {
    let worker = Worker::new(
        WorkerConfig {
            poll_timeout_sec: 1,
            poll_interval: Duration::from_millis(5),
            allowed_updates: vec!["message".into()],
        },
        client,
        store,
    );

    let token = CancellationToken::new();
    let run_token = token.clone();
    let handle = tokio::spawn(async move { worker.run(run_token).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            token.cancel();
            let _ = handle.await;
            panic!("timed out waiting for the worker to make progress");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    token.cancel();
    handle.await.expect("worker task panicked")
}
