use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FacadeError {
    #[error("Control server is not connected")]
    NotConnected,
    #[error("Client {0} is not known to the control server")]
    UnknownClient(i32),
    #[error("Client {0} does not hold the baton")]
    NotHolder(i32),
    #[error("Client {client} (level {level}) may not take the baton from a holder with level {holder_level}")]
    NotAuthorised {
        client: i32,
        level: i32,
        holder_level: i32,
    },
    #[error("Control server call failed: {0}")]
    Rpc(String),
}

#[derive(Debug, Clone, Error)]
pub enum BatonStateError {
    #[error("Baton snapshot reports more than one holder: clients {0:?}")]
    MultipleHolders(Vec<i32>),
    #[error("Baton snapshot failed due to facade error: {0}")]
    FacadeError(#[from] FacadeError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MessageLogError {
    #[error("MessageLog failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("MessageLog failed to format a timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("MessageLog found a malformed line: {0}")]
    BadLine(String),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Console failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Console failed due to MessageLog error: {0}")]
    MessageLogError(#[from] MessageLogError),
    #[error("Console failed due to facade error: {0}")]
    FacadeError(#[from] FacadeError),
    #[error("Console failed to spawn a background thread: {0}")]
    IOError(#[from] std::io::Error),
}
