//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers all failure classes the mail MCP server can hit. Each variant maps
/// to an appropriate MCP error code in [`ErrorData`]. Capability gaps (flag
/// operations on a POP3-only mailbox) and partial decode failures are not
/// errors at all; they are handled locally and never reach this type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required configuration absent or malformed (bad env variable)
    #[error("configuration error: {0}")]
    Config(String),
    /// Invalid tool input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Identifier does not name a message on the server
    #[error("not found: {0}")]
    NotFound(String),
    /// Authentication failure (bad credentials, account disabled)
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Operation timeout (TCP connect, TLS handshake, protocol exchange)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Transport failure (DNS, TCP connect, TLS handshake)
    #[error("transport error: {0}")]
    Transport(String),
    /// Unexpected protocol response (server error reply, malformed data)
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// Maps each `AppError` variant to the appropriate MCP error type and
    /// includes a structured `code` field for client error handling.
    ///
    /// # Mappings
    ///
    /// - `Config` → `invalid_request`
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound` → `resource_not_found`
    /// - `AuthFailed` → `invalid_request`
    /// - `Timeout` → `internal_error`
    /// - `Transport` → `internal_error`
    /// - `Protocol` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::Config(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "config" })))
            }
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::NotFound(msg) => {
                ErrorData::resource_not_found(msg.clone(), Some(json!({ "code": "not_found" })))
            }
            Self::AuthFailed(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "auth_failed" })))
            }
            Self::Timeout(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "timeout" })))
            }
            Self::Transport(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "transport" })))
            }
            Self::Protocol(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "protocol" })))
            }
        }
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;
