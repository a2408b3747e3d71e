//! Core error types for the Skript engine

#[derive(thiserror::Error, Debug)]
pub enum SkriptError {
    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, SkriptError>;
