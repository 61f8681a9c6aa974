//! Process entrypoint: wires the store, the platform client, the polling
//! worker and the health server under one cancellation token, and shuts
//! everything down within the configured deadline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use compass_core::{logging, Config};
use compass_store::{db, SqliteStore, Store};
use compass_telegram::util::parse_allowed_updates;
use compass_telegram::{HttpBotClient, Worker, WorkerConfig, WorkerError};

mod app;
mod http;

#[tokio::main]
async fn main() {
    let cfg = match Config::load(None) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("load config failed: {err}");
            std::process::exit(1);
        }
    };

    logging::init(&cfg.log);
    info!(env = %cfg.app_env, http_port = %cfg.http.port, "configuration loaded");

    if let Err(err) = run(cfg).await {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
    info!("server stopped");
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let conn = db::open(&cfg.database.dsn).context("open database")?;
    db::init_db(&conn).context("init database schema")?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(conn));
    store.ping().context("database ping")?;

    let client = Arc::new(
        HttpBotClient::new(&cfg.telegram.bot_token).context("build telegram client")?,
    );
    let worker = Worker::new(
        WorkerConfig {
            poll_timeout_sec: cfg.telegram.poll_timeout_sec,
            poll_interval: Duration::from_millis(cfg.telegram.poll_interval_ms as u64),
            allowed_updates: parse_allowed_updates(&cfg.telegram.allowed_updates),
        },
        client,
        store.clone(),
    );

    let token = CancellationToken::new();

    let state = Arc::new(app::AppState::new(store));
    let router = app::build_router(state, cfg.http.write_timeout);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http.port)
        .parse()
        .context("parse http listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind http listener")?;
    info!(addr = %addr, "http server listening");

    let server_token = token.clone();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
    });

    let worker_token = token.clone();
    let mut worker_task = tokio::spawn(async move { worker.run(worker_token).await });

    let mut worker_done = false;
    let mut server_done = false;
    let mut failure: Option<anyhow::Error> = None;

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        result = &mut worker_task => {
            worker_done = true;
            record_worker_exit(result, &mut failure);
        }
        result = &mut server_task => {
            server_done = true;
            record_server_exit(result, &mut failure);
        }
    }

    token.cancel();

    let shutdown_timeout = cfg.http.shutdown_timeout;
    let drain = async {
        if !worker_done {
            let result = worker_task.await;
            record_worker_exit(result, &mut failure);
        }
        if !server_done {
            let result = server_task.await;
            record_server_exit(result, &mut failure);
        }
    };

    if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
        anyhow::bail!(
            "shutdown exceeded {}",
            humantime::format_duration(shutdown_timeout)
        );
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn record_worker_exit(
    result: Result<Result<(), WorkerError>, JoinError>,
    failure: &mut Option<anyhow::Error>,
) {
    match result {
        Ok(Ok(())) => info!("polling worker exited"),
        Ok(Err(err)) => {
            error!(error = %err, "polling worker failed");
            if failure.is_none() {
                *failure = Some(anyhow::Error::new(err));
            }
        }
        Err(err) => {
            error!(error = %err, "polling worker panicked");
            if failure.is_none() {
                *failure = Some(anyhow::Error::new(err));
            }
        }
    }
}

fn record_server_exit(
    result: Result<std::io::Result<()>, JoinError>,
    failure: &mut Option<anyhow::Error>,
) {
    match result {
        Ok(Ok(())) => info!("http server exited"),
        Ok(Err(err)) => {
            error!(error = %err, "http server failed");
            if failure.is_none() {
                *failure = Some(anyhow::Error::new(err));
            }
        }
        Err(err) => {
            error!(error = %err, "http server panicked");
            if failure.is_none() {
                *failure = Some(anyhow::Error::new(err));
            }
        }
    }
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
