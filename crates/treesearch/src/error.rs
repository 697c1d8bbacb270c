use std::path::PathBuf;

/// Query validation failures, reported synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown search option: {0}")]
    UnknownOption(String),

    #[error("invalid regular expression {pattern:?}: {message}")]
    BadRegex { pattern: String, message: String },

    #[error("invalid date value: {0:?}")]
    BadDate(String),

    #[error("invalid integer value: {0:?}")]
    BadInteger(String),

    #[error("invalid boolean value: {0:?}")]
    BadBoolean(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Query parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("command was canceled")]
    Canceled,

    #[error("command faulted: {0}")]
    Faulted(String),

    #[error("command engine has stopped")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, IndexError>;
