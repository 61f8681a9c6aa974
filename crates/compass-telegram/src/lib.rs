pub mod client;
pub mod dto;
pub mod metrics;
pub mod sender;
pub mod util;
pub mod worker;

pub use client::{ApiError, BotClient, ClientError, HttpBotClient};
pub use sender::{SendError, Sender};
pub use worker::{Worker, WorkerConfig, WorkerError};
