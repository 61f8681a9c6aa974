use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required env: {0}")]
    MissingEnv(String),

    #[error("parse {key}: {reason}")]
    EnvParse { key: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
