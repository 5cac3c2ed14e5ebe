//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers six MCP tools. Handles
//! input validation, store/mailer orchestration, and response formatting.

use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};

use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use crate::mailbox::{FlagOutcome, MessageStore, select_store};
use crate::models::{
    ListMessagesInput, MessageRefInput, MessageSummary, Meta, RawMessage, SendEmailInput,
    ToolEnvelope,
};
use crate::smtp::SmtpMailer;

/// Maximum messages per list request
const MAX_LIST_ITEMS: usize = 200;
/// Maximum identifier length accepted at the tool boundary
const MAX_UID_CHARS: usize = 32;

/// Plain mailbox MCP server
///
/// Holds the backend store chosen at startup and the SMTP mailer. Implements
/// MCP tool handlers via the `#[tool]` attribute macro and `ServerHandler`
/// trait.
#[derive(Clone)]
pub struct PlainMailServer {
    /// Mailbox backend (POP3 or IMAP), selected once from config
    store: Arc<dyn MessageStore>,
    /// SMTP submission handle
    mailer: SmtpMailer,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl PlainMailServer {
    /// Create a new MCP server instance
    ///
    /// Selects the mailbox backend once from the supplied configuration.
    pub fn new(config: MailConfig) -> Self {
        let config = Arc::new(config);
        Self {
            store: select_store(Arc::clone(&config)),
            mailer: SmtpMailer::new(config),
            tool_router: Self::tool_router(),
        }
    }

    /// Tool: List recent messages, newest first
    ///
    /// `flagged_only` restricts results to flagged messages on IMAP; POP3
    /// accepts and ignores it.
    #[tool(
        name = "list_messages",
        description = "List recent messages, newest first"
    )]
    async fn list_messages(
        &self,
        Parameters(input): Parameters<ListMessagesInput>,
    ) -> Result<Json<ToolEnvelope<Vec<MessageSummary>>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_messages_impl(input)
                .await
                .map(|data| (format!("{} message(s) returned", data.len()), data)),
        )
    }

    /// Tool: Get the full RFC 822 text of one message
    #[tool(name = "get_message", description = "Get the full text of a message")]
    async fn get_message(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<RawMessage>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.get_message_impl(input)
                .await
                .map(|data| ("Message retrieved".to_owned(), data)),
        )
    }

    /// Tool: Permanently delete a message
    #[tool(name = "delete_message", description = "Delete a message permanently")]
    async fn delete_message(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<serde_json::Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.delete_message_impl(input).await)
    }

    /// Tool: Flag a message
    #[tool(name = "flag_message", description = "Flag (star) a message")]
    async fn flag_message(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<serde_json::Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.set_flagged_impl(input, true).await)
    }

    /// Tool: Remove the flag from a message
    #[tool(name = "unflag_message", description = "Remove the flag from a message")]
    async fn unflag_message(
        &self,
        Parameters(input): Parameters<MessageRefInput>,
    ) -> Result<Json<ToolEnvelope<serde_json::Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.set_flagged_impl(input, false).await)
    }

    /// Tool: Send a plain-text email
    #[tool(name = "send_email", description = "Send a plain-text email")]
    async fn send_email(
        &self,
        Parameters(input): Parameters<SendEmailInput>,
    ) -> Result<Json<ToolEnvelope<serde_json::Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(started, self.send_email_impl(input).await)
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to the MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for PlainMailServer {
    fn get_info(&self) -> ServerInfo {
        // ServerInfo is #[non_exhaustive]; it cannot be built with a struct
        // expression outside rmcp, so start from Default and set fields.
        let mut info = ServerInfo::default();
        info.instructions = Some(
            "Plain mailbox MCP server. Lists, fetches, deletes, and flags messages over POP3 or IMAP, and sends mail over SMTP.".to_owned(),
        );
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual business logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl PlainMailServer {
    async fn list_messages_impl(
        &self,
        input: ListMessagesInput,
    ) -> AppResult<Vec<MessageSummary>> {
        validate_max_items(input.max_items)?;
        self.store
            .list_messages(input.max_items, input.flagged_only)
            .await
    }

    async fn get_message_impl(&self, input: MessageRefInput) -> AppResult<RawMessage> {
        validate_uid(&input.uid)?;
        self.store.get_message(&input.uid).await
    }

    async fn delete_message_impl(
        &self,
        input: MessageRefInput,
    ) -> AppResult<(String, serde_json::Value)> {
        validate_uid(&input.uid)?;
        let uid = input.uid.trim().to_owned();
        self.store.delete_message(&uid).await?;
        Ok((
            format!("Message {uid} deleted."),
            serde_json::json!({ "uid": uid }),
        ))
    }

    async fn set_flagged_impl(
        &self,
        input: MessageRefInput,
        flagged: bool,
    ) -> AppResult<(String, serde_json::Value)> {
        validate_uid(&input.uid)?;
        let uid = input.uid.trim().to_owned();
        match self.store.set_flagged(&uid, flagged).await? {
            FlagOutcome::Applied => {
                let action = if flagged { "flagged" } else { "unflagged" };
                Ok((
                    format!("Message {uid} {action}."),
                    serde_json::json!({ "uid": uid, "applied": true }),
                ))
            }
            FlagOutcome::Unsupported => {
                let action = if flagged { "Flagging" } else { "Unflagging" };
                Ok((
                    format!("{action} not supported on POP-only mailboxes."),
                    serde_json::json!({ "uid": uid, "applied": false }),
                ))
            }
        }
    }

    async fn send_email_impl(
        &self,
        input: SendEmailInput,
    ) -> AppResult<(String, serde_json::Value)> {
        validate_send_input(&input)?;
        let recipients = self.mailer.send(&input).await?;
        Ok((
            "Email sent.".to_owned(),
            serde_json::json!({ "to": input.to, "recipients": recipients }),
        ))
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from business logic output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// Validate list item count
fn validate_max_items(value: usize) -> AppResult<()> {
    if !(1..=MAX_LIST_ITEMS).contains(&value) {
        return Err(AppError::invalid(format!(
            "max_items must be in range 1..{MAX_LIST_ITEMS}"
        )));
    }
    Ok(())
}

/// Validate message identifier shape
///
/// Backend-specific numeric parsing happens in the store; the boundary only
/// rejects values that could never name a message.
fn validate_uid(uid: &str) -> AppResult<()> {
    let trimmed = uid.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_UID_CHARS {
        return Err(AppError::invalid(format!(
            "uid must be 1..{MAX_UID_CHARS} characters"
        )));
    }
    validate_no_controls(trimmed, "uid")
}

/// Reject control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::invalid(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate send_email input
///
/// Addresses are control-checked here; structural validation happens when
/// they are parsed as mailboxes.
fn validate_send_input(input: &SendEmailInput) -> AppResult<()> {
    if input.to.trim().is_empty() {
        return Err(AppError::invalid("to must not be empty"));
    }
    validate_no_controls(&input.to, "to")?;
    validate_no_controls(&input.cc, "cc")?;
    validate_no_controls(&input.bcc, "bcc")?;
    Ok(())
}
