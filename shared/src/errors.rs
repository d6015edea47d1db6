//! Shared error types for the log-shipping agent

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid node identity: {input}")]
    InvalidNodeIdentity { input: String },

    #[error("Record encoding failed: {message}")]
    EncodingError { message: String },

    #[error("Log setup failed for {path}: {message}")]
    LogSetupError { path: String, message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
