//! tracing-subscriber initialisation from `LogConfig`.
//!
//! `RUST_LOG` wins when set; otherwise `LOG_LEVEL` seeds the filter.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub fn init(cfg: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(&cfg.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if cfg.add_source {
        builder.with_file(true).with_line_number(true).init();
    } else {
        builder.init();
    }
}

fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}
