//! Mailbox backend abstraction
//!
//! Unifies POP3 and IMAP semantics behind a single `MessageStore` trait. The
//! backend is chosen once at startup from configuration; every store method
//! opens one connection, acts, and closes it before returning. There is no
//! pooling and no fallback between backends at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use crate::imap;
use crate::mime;
use crate::models::{MessageSummary, RawMessage};
use crate::pop3;

/// Result of a flag or unflag request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOutcome {
    /// The store applied the flag change
    Applied,
    /// The backend has no flag concept; nothing was attempted
    Unsupported,
}

/// Backend-neutral mailbox operations
///
/// Identifiers are backend-native strings: IMAP UIDs or POP3 1-based
/// ordinals, not interchangeable between backends.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Short backend name for logs and capability messages
    fn backend(&self) -> &'static str;

    /// Newest-first message summaries
    async fn list_messages(
        &self,
        max_items: usize,
        flagged_only: bool,
    ) -> AppResult<Vec<MessageSummary>>;

    /// Full RFC 822 source of one message
    async fn get_message(&self, uid: &str) -> AppResult<RawMessage>;

    /// Permanently delete one message
    async fn delete_message(&self, uid: &str) -> AppResult<()>;

    /// Add or remove `\Flagged`, where the backend supports flags
    async fn set_flagged(&self, uid: &str, flagged: bool) -> AppResult<FlagOutcome>;
}

/// Choose the backend once from configuration
///
/// A configured IMAP port selects IMAP; otherwise POP3.
pub fn select_store(config: Arc<MailConfig>) -> Arc<dyn MessageStore> {
    if config.use_imap() {
        info!(
            "using IMAP mailbox backend at {}:{}",
            config.host,
            config.mailbox_port()
        );
        Arc::new(ImapStore::new(config))
    } else {
        info!(
            "using POP3 mailbox backend at {}:{}",
            config.host,
            config.mailbox_port()
        );
        Arc::new(Pop3Store::new(config))
    }
}

/// POP3-backed store
///
/// Ordinals are 1-based and oldest-first on the wire; results are reversed
/// to newest-first. POP3 has no flag concept: `flagged_only` is accepted but
/// ignored, and flag requests return [`FlagOutcome::Unsupported`] without
/// any network I/O.
pub struct Pop3Store {
    config: Arc<MailConfig>,
}

impl Pop3Store {
    pub fn new(config: Arc<MailConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MessageStore for Pop3Store {
    fn backend(&self) -> &'static str {
        "pop3"
    }

    async fn list_messages(
        &self,
        max_items: usize,
        _flagged_only: bool,
    ) -> AppResult<Vec<MessageSummary>> {
        let mut session = pop3::connect_authenticated(&self.config).await?;
        let result = async {
            let total = session.stat().await?;
            let mut summaries = Vec::new();
            for ordinal in pop3_window(total, max_items) {
                let header_bytes = session.top(ordinal).await?;
                summaries.push(mime::summary_from_headers(
                    ordinal.to_string(),
                    &header_bytes,
                    false,
                ));
            }
            summaries.reverse();
            Ok(summaries)
        }
        .await;
        session.quit().await.ok();
        result
    }

    async fn get_message(&self, uid: &str) -> AppResult<RawMessage> {
        let ordinal = parse_pop3_uid(uid)?;
        let mut session = pop3::connect_authenticated(&self.config).await?;
        let result = session.retr(ordinal).await;
        session.quit().await.ok();
        let raw = result?;
        Ok(RawMessage {
            uid: ordinal.to_string(),
            text: mime::decode_lossy(&raw),
        })
    }

    async fn delete_message(&self, uid: &str) -> AppResult<()> {
        let ordinal = parse_pop3_uid(uid)?;
        let mut session = pop3::connect_authenticated(&self.config).await?;
        // The server only commits the delete on a clean QUIT.
        match session.dele(ordinal).await {
            Ok(()) => session.quit().await,
            Err(e) => {
                session.quit().await.ok();
                Err(e)
            }
        }
    }

    async fn set_flagged(&self, _uid: &str, _flagged: bool) -> AppResult<FlagOutcome> {
        Ok(FlagOutcome::Unsupported)
    }
}

/// IMAP-backed store
///
/// Identifiers are IMAP UIDs within INBOX. Every operation runs on a fresh
/// session with INBOX selected and logs out best-effort afterwards.
pub struct ImapStore {
    config: Arc<MailConfig>,
}

impl ImapStore {
    pub fn new(config: Arc<MailConfig>) -> Self {
        Self { config }
    }

    /// Open an authenticated session with INBOX selected
    async fn open(&self) -> AppResult<imap::ImapSession> {
        let mut session = imap::connect_authenticated(&self.config).await?;
        match imap::select_inbox(&self.config, &mut session).await {
            Ok(()) => Ok(session),
            Err(e) => {
                imap::logout(&self.config, &mut session).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MessageStore for ImapStore {
    fn backend(&self) -> &'static str {
        "imap"
    }

    async fn list_messages(
        &self,
        max_items: usize,
        flagged_only: bool,
    ) -> AppResult<Vec<MessageSummary>> {
        let mut session = self.open().await?;
        let result = async {
            let query = if flagged_only { "FLAGGED" } else { "ALL" };
            let mut uids = imap::uid_search(&self.config, &mut session, query).await?;
            uids.truncate(max_items);

            let mut summaries = Vec::with_capacity(uids.len());
            for uid in uids {
                let (header_bytes, is_flagged) =
                    imap::fetch_headers_and_flags(&self.config, &mut session, uid).await?;
                summaries.push(mime::summary_from_headers(
                    uid.to_string(),
                    &header_bytes,
                    is_flagged,
                ));
            }
            Ok(summaries)
        }
        .await;
        imap::logout(&self.config, &mut session).await;
        result
    }

    async fn get_message(&self, uid: &str) -> AppResult<RawMessage> {
        let uid = parse_imap_uid(uid)?;
        let mut session = self.open().await?;
        let result = imap::fetch_raw_message(&self.config, &mut session, uid).await;
        imap::logout(&self.config, &mut session).await;
        let raw = result?;
        Ok(RawMessage {
            uid: uid.to_string(),
            text: mime::decode_lossy(&raw),
        })
    }

    async fn delete_message(&self, uid: &str) -> AppResult<()> {
        let uid = parse_imap_uid(uid)?;
        let mut session = self.open().await?;
        let result = async {
            imap::uid_store(&self.config, &mut session, uid, "+FLAGS.SILENT (\\Deleted)").await?;
            imap::expunge(&self.config, &mut session).await
        }
        .await;
        imap::logout(&self.config, &mut session).await;
        result
    }

    async fn set_flagged(&self, uid: &str, flagged: bool) -> AppResult<FlagOutcome> {
        let uid = parse_imap_uid(uid)?;
        let query = if flagged {
            "+FLAGS.SILENT (\\Flagged)"
        } else {
            "-FLAGS.SILENT (\\Flagged)"
        };
        let mut session = self.open().await?;
        let result = imap::uid_store(&self.config, &mut session, uid, query).await;
        imap::logout(&self.config, &mut session).await;
        result.map(|()| FlagOutcome::Applied)
    }
}

/// Ordinal window covering the newest `max_items` messages
///
/// Clamps to the mailbox size; an oversized request covers everything.
fn pop3_window(total: usize, max_items: usize) -> std::ops::RangeInclusive<usize> {
    let start = (total + 1).saturating_sub(max_items).max(1);
    start..=total
}

/// Parse a POP3 ordinal (1-based)
fn parse_pop3_uid(uid: &str) -> AppResult<usize> {
    let ordinal = uid
        .trim()
        .parse::<usize>()
        .map_err(|_| AppError::invalid(format!("uid must be a POP3 message number: '{uid}'")))?;
    if ordinal == 0 {
        return Err(AppError::invalid("uid must be a positive message number"));
    }
    Ok(ordinal)
}

/// Parse an IMAP UID
fn parse_imap_uid(uid: &str) -> AppResult<u32> {
    let parsed = uid
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::invalid(format!("uid must be an IMAP uid: '{uid}'")))?;
    if parsed == 0 {
        return Err(AppError::invalid("uid must be a positive message number"));
    }
    Ok(parsed)
}
