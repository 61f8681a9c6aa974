//! Environment-driven configuration.
//!
//! A `.env` file is loaded first (via dotenvy, which never overrides
//! variables already present in the process environment), then every
//! setting is read from the environment with the documented default.

use std::time::Duration;

use crate::error::{CoreError, Result};

/// Top-level runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: String,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub port: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
}

/// Database settings. `dsn` is the SQLite database path.
///
/// The pool-sizing knobs are part of the deployment contract and are
/// validated here even though the SQLite backend runs a single guarded
/// connection; a server-grade backend would apply them directly.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub dsn: String,
    pub max_open_conns: i64,
    pub max_idle_conns: i64,
    pub conn_max_lifetime: Duration,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub poll_timeout_sec: i64,
    pub poll_interval_ms: i64,
    /// Comma-separated update kinds, e.g. "message".
    pub allowed_updates: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub add_source: bool,
}

impl Config {
    /// Load config from a `.env` file (default `./.env`) plus the process
    /// environment. Existing process env always wins over the file.
    pub fn load(env_file: Option<&str>) -> Result<Self> {
        let loaded = match env_file {
            Some(path) => dotenvy::from_path(path).map(|_| ()),
            None => dotenvy::dotenv().map(|_| ()),
        };
        if let Err(err) = loaded {
            if !err.not_found() {
                return Err(CoreError::Config(format!("load env file: {err}")));
            }
        }

        let cfg = Self::from_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_env() -> Result<Self> {
        Ok(Self {
            app_env: env_str("APP_ENV", "development"),
            http: HttpConfig {
                port: env_str("HTTP_PORT", "8080"),
                read_timeout: env_duration("HTTP_READ_TIMEOUT", Duration::from_secs(10))?,
                write_timeout: env_duration("HTTP_WRITE_TIMEOUT", Duration::from_secs(10))?,
                shutdown_timeout: env_duration("HTTP_SHUTDOWN_TIMEOUT", Duration::from_secs(10))?,
            },
            database: DatabaseConfig {
                dsn: env_str("DB_DSN", ""),
                max_open_conns: env_int("DB_MAX_OPEN_CONNS", 20)?,
                max_idle_conns: env_int("DB_MAX_IDLE_CONNS", 10)?,
                conn_max_lifetime: env_duration("DB_CONN_MAX_LIFETIME", Duration::from_secs(30 * 60))?,
            },
            telegram: TelegramConfig {
                bot_token: env_str("TELEGRAM_BOT_TOKEN", ""),
                poll_timeout_sec: env_int("TELEGRAM_POLL_TIMEOUT_SEC", 50)?,
                poll_interval_ms: env_int("TELEGRAM_POLL_INTERVAL_MS", 200)?,
                allowed_updates: env_str("TELEGRAM_ALLOWED_UPDATES", "message"),
            },
            log: LogConfig {
                level: env_str("LOG_LEVEL", "info"),
                add_source: env_bool("LOG_ADD_SOURCE", false)?,
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.database.dsn.trim().is_empty() {
            missing.push("DB_DSN");
        }
        if self.telegram.bot_token.trim().is_empty() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        if self.http.port.trim().is_empty() {
            missing.push("HTTP_PORT");
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingEnv(missing.join(", ")));
        }

        if self.telegram.poll_timeout_sec <= 0 {
            return Err(CoreError::Config(
                "TELEGRAM_POLL_TIMEOUT_SEC must be > 0".into(),
            ));
        }
        if self.telegram.poll_interval_ms < 0 {
            return Err(CoreError::Config(
                "TELEGRAM_POLL_INTERVAL_MS must be >= 0".into(),
            ));
        }
        if self.http.read_timeout.is_zero()
            || self.http.write_timeout.is_zero()
            || self.http.shutdown_timeout.is_zero()
        {
            return Err(CoreError::Config("HTTP timeouts must be > 0".into()));
        }
        if self.database.max_open_conns <= 0 {
            return Err(CoreError::Config("DB_MAX_OPEN_CONNS must be > 0".into()));
        }
        if self.database.max_idle_conns < 0 {
            return Err(CoreError::Config("DB_MAX_IDLE_CONNS must be >= 0".into()));
        }
        if self.database.max_idle_conns > self.database.max_open_conns {
            return Err(CoreError::Config(
                "DB_MAX_IDLE_CONNS must be <= DB_MAX_OPEN_CONNS".into(),
            ));
        }
        if self.database.conn_max_lifetime.is_zero() {
            return Err(CoreError::Config("DB_CONN_MAX_LIFETIME must be > 0".into()));
        }

        Ok(())
    }
}

fn env_str(key: &'static str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_int(key: &'static str, fallback: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: std::num::ParseIntError| {
                CoreError::EnvParse {
                    key,
                    reason: e.to_string(),
                }
            })
        }
        _ => Ok(fallback),
    }
}

fn env_duration(key: &'static str, fallback: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => humantime::parse_duration(value.trim())
            .map_err(|e| CoreError::EnvParse {
                key,
                reason: e.to_string(),
            }),
        _ => Ok(fallback),
    }
}

fn env_bool(key: &'static str, fallback: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Ok(true),
            "0" | "f" | "false" => Ok(false),
            other => Err(CoreError::EnvParse {
                key,
                reason: format!("invalid bool {other:?}"),
            }),
        },
        _ => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            app_env: "test".into(),
            http: HttpConfig {
                port: "8080".into(),
                read_timeout: Duration::from_secs(10),
                write_timeout: Duration::from_secs(10),
                shutdown_timeout: Duration::from_secs(10),
            },
            database: DatabaseConfig {
                dsn: "compass.db".into(),
                max_open_conns: 20,
                max_idle_conns: 10,
                conn_max_lifetime: Duration::from_secs(1800),
            },
            telegram: TelegramConfig {
                bot_token: "token".into(),
                poll_timeout_sec: 50,
                poll_interval_ms: 200,
                allowed_updates: "message".into(),
            },
            log: LogConfig {
                level: "info".into(),
                add_source: false,
            },
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_required_vars_are_reported_together() {
        let mut cfg = valid_config();
        cfg.database.dsn = String::new();
        cfg.telegram.bot_token = "  ".into();
        let err = cfg.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("DB_DSN"), "got: {msg}");
        assert!(msg.contains("TELEGRAM_BOT_TOKEN"), "got: {msg}");
    }

    #[test]
    fn idle_conns_may_not_exceed_open_conns() {
        let mut cfg = valid_config();
        cfg.database.max_idle_conns = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn poll_timeout_must_be_positive() {
        let mut cfg = valid_config();
        cfg.telegram.poll_timeout_sec = 0;
        assert!(cfg.validate().is_err());
    }
}
