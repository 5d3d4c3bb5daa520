//! MCP error types.
//!
//! Transport-level failures cost a server its healthy bit; protocol-level
//! failures do not.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Server disabled: {0}")]
    ServerDisabled(String),

    #[error("Server unhealthy: {0}")]
    ServerUnhealthy(String),

    /// Connection collapse: connect refused, read timeout, HTTP non-2xx.
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC `error` member or a malformed result payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl McpError {
    /// True when the failure indicates the connection to the server collapsed
    /// and its healthy bit must be cleared.
    pub fn is_transport(&self) -> bool {
        matches!(self, McpError::Transport(_) | McpError::ConnectionFailed(_))
    }
}
