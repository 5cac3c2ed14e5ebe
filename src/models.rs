//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
/// This structure provides consistent response shape across all MCP tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Message summary for list results
///
/// Lightweight representation returned by `list_messages`. Headers that are
/// missing from the message yield empty strings rather than being omitted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageSummary {
    /// Backend-native message identifier (IMAP UID or POP3 ordinal)
    pub uid: String,
    /// Decoded From header
    pub from: String,
    /// Decoded Subject header
    pub subject: String,
    /// Raw Date header as supplied by the server
    pub date: String,
    /// Whether the message carries `\Flagged` (always false under POP3)
    pub is_flagged: bool,
}

/// Full message source
///
/// Returned by `get_message`. Undecodable bytes in the source are replaced,
/// never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawMessage {
    /// Backend-native message identifier (IMAP UID or POP3 ordinal)
    pub uid: String,
    /// Full RFC 822 text of the message
    pub text: String,
}

/// Input: list recent messages
///
/// Used by `list_messages`. `flagged_only` is honored on IMAP and accepted
/// but ignored on POP3, which has no flag concept.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListMessagesInput {
    /// Maximum messages to return (1..200, default 10)
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Restrict results to flagged messages (IMAP only)
    #[serde(default)]
    pub flagged_only: bool,
}

/// Input: single message reference
///
/// Used by `get_message`, `delete_message`, `flag_message`, and
/// `unflag_message`. The identifier is backend-native: an IMAP UID or a
/// POP3 1-based ordinal, both rendered as strings.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MessageRefInput {
    /// Backend-native message identifier
    pub uid: String,
}

/// Input: send a plain-text email
///
/// Used by `send_email`. CC and BCC are comma-separated address lists;
/// entries are trimmed and empty entries dropped.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendEmailInput {
    /// Recipient address (single mailbox)
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text message body
    pub body: String,
    /// Comma-separated CC addresses (visible in headers)
    #[serde(default)]
    pub cc: String,
    /// Comma-separated BCC addresses (envelope only, never in headers)
    #[serde(default)]
    pub bcc: String,
}

/// Default value for `max_items` in list_messages
///
/// Chosen as a reasonable balance between response size and repeat calls.
/// Most agents need to see only the most recent handful of messages.
fn default_max_items() -> usize {
    10
}
