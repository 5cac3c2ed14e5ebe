//! IMAP transport and session operations
//!
//! Provides timeout-bounded wrappers around `async-imap` operations. All
//! sessions run over TLS: implicit TLS when `ssl` is enabled, otherwise a
//! mandatory STARTTLS upgrade. STARTTLS failure is fatal; there is no
//! plaintext IMAP session.

use std::fmt;

use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use crate::tls;

/// Type alias for authenticated IMAP session over TLS
///
/// Both connect paths end on the same stream type, which keeps signatures
/// uniform throughout the codebase.
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Connect to the IMAP server and authenticate
///
/// Performs the full connection sequence with timeouts:
/// 1. TCP connect
/// 2. TLS: implicit handshake (`ssl`) or greeting + STARTTLS + handshake
/// 3. LOGIN authentication
///
/// # Errors
///
/// - `Timeout` if any connection phase times out
/// - `AuthFailed` if authentication fails
/// - `Transport` for TCP, TLS, or STARTTLS failures
/// - `Protocol` for unexpected login responses
pub async fn connect_authenticated(config: &MailConfig) -> AppResult<ImapSession> {
    let port = config.imap_port.unwrap_or(993);
    let tcp = timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Transport(format!("tcp connect failed: {e}"))))?;

    let connector = tls::connector(config.allow_self_signed);
    let server_name = tls::server_name(&config.host)?;

    let client = if config.ssl {
        let tls_stream = handshake(config, &connector, server_name, tcp).await?;
        let mut client = Client::new(tls_stream);
        read_greeting(config, &mut client).await?;
        client
    } else {
        let mut plain = Client::new(tcp);
        read_greeting(config, &mut plain).await?;
        timeout(
            config.greeting_timeout,
            plain.run_command_and_check_ok("STARTTLS", None),
        )
        .await
        .map_err(|_| AppError::Timeout("STARTTLS timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Transport(format!("STARTTLS refused: {e}"))))?;
        let tls_stream = handshake(config, &connector, server_name, plain.into_inner()).await?;
        Client::new(tls_stream)
    };

    login(config, client).await
}

/// Perform the TLS handshake under the greeting deadline
async fn handshake(
    config: &MailConfig,
    connector: &TlsConnector,
    server_name: ServerName<'static>,
    tcp: TcpStream,
) -> AppResult<tokio_rustls::client::TlsStream<TcpStream>> {
    timeout(config.greeting_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Transport(format!("TLS handshake failed: {e}"))))
}

/// Read the server greeting off a fresh connection
async fn read_greeting<T>(config: &MailConfig, client: &mut Client<T>) -> AppResult<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + fmt::Debug + Send,
{
    let greeting = timeout(config.greeting_timeout, client.read_response())
        .await
        .map_err(|_| AppError::Timeout("IMAP greeting timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Transport(format!("IMAP greeting failed: {e}"))))?;
    if greeting.is_none() {
        return Err(AppError::Transport(
            "IMAP server closed connection before greeting".to_owned(),
        ));
    }
    Ok(())
}

/// LOGIN on an established TLS client
async fn login(
    config: &MailConfig,
    client: Client<tokio_rustls::client::TlsStream<TcpStream>>,
) -> AppResult<ImapSession> {
    let pass = config.password.expose_secret();
    timeout(
        config.greeting_timeout,
        client.login(config.user.as_str(), pass),
    )
    .await
    .map_err(|_| AppError::Timeout("IMAP login timeout".to_owned()))
    .and_then(|r| {
        r.map_err(|(e, _)| {
            let msg = e.to_string();
            if msg.to_ascii_lowercase().contains("auth") || msg.contains("LOGIN") {
                AppError::AuthFailed(msg)
            } else {
                AppError::Protocol(msg)
            }
        })
    })
}

/// Select the INBOX in read-write mode
pub async fn select_inbox(config: &MailConfig, session: &mut ImapSession) -> AppResult<()> {
    timeout(config.socket_timeout, session.select("INBOX"))
        .await
        .map_err(|_| AppError::Timeout("SELECT timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("cannot select INBOX: {e}"))))?;
    Ok(())
}

/// Search for messages matching query
///
/// Runs `UID SEARCH` and returns matching UIDs in descending order (newest
/// first). Callers truncate the result set to their item limit.
pub async fn uid_search(
    config: &MailConfig,
    session: &mut ImapSession,
    query: &str,
) -> AppResult<Vec<u32>> {
    let set = timeout(config.socket_timeout, session.uid_search(query))
        .await
        .map_err(|_| AppError::Timeout("UID SEARCH timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("uid search failed: {e}"))))?;
    let mut uids: Vec<u32> = set.into_iter().collect();
    uids.sort_unstable_by(|a, b| b.cmp(a));
    Ok(uids)
}

/// Fetch a single message with custom query
///
/// Runs a `UID FETCH` for a specific UID and returns the first result.
async fn fetch_one(
    config: &MailConfig,
    session: &mut ImapSession,
    uid: u32,
    query: &str,
) -> AppResult<Fetch> {
    let stream = timeout(
        config.socket_timeout,
        session.uid_fetch(uid.to_string(), query),
    )
    .await
    .map_err(|_| AppError::Timeout("UID FETCH timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Protocol(format!("uid fetch failed: {e}"))))?;
    let fetches: Vec<Fetch> = timeout(config.socket_timeout, stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID FETCH stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("uid fetch stream failed: {e}"))))?;

    fetches
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("message uid {uid} not found")))
}

/// Fetch the header block and flagged state of one message
///
/// Uses `BODY.PEEK` so the fetch never downloads the body and never sets
/// `\Seen`.
pub async fn fetch_headers_and_flags(
    config: &MailConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<(Vec<u8>, bool)> {
    let fetch = fetch_one(config, session, uid, "(UID FLAGS BODY.PEEK[HEADER])").await?;
    let header_bytes = fetch
        .header()
        .or_else(|| fetch.body())
        .ok_or_else(|| AppError::Protocol("message headers not available".to_owned()))?
        .to_vec();
    Ok((header_bytes, is_flagged(&fetch)))
}

/// Fetch full RFC822 message source
///
/// Returns raw bytes of the entire message.
pub async fn fetch_raw_message(
    config: &MailConfig,
    session: &mut ImapSession,
    uid: u32,
) -> AppResult<Vec<u8>> {
    let fetch = fetch_one(config, session, uid, "RFC822").await?;
    let body = fetch
        .body()
        .ok_or_else(|| AppError::Protocol("message has no RFC822 body".to_owned()))?;
    Ok(body.to_vec())
}

/// Store flags on a message
///
/// Runs `UID STORE` with a flag query string. Use `+FLAGS.SILENT` to add
/// flags or `-FLAGS.SILENT` to remove flags.
pub async fn uid_store(
    config: &MailConfig,
    session: &mut ImapSession,
    uid: u32,
    query: &str,
) -> AppResult<()> {
    let stream = timeout(
        config.socket_timeout,
        session.uid_store(uid.to_string(), query),
    )
    .await
    .map_err(|_| AppError::Timeout("UID STORE timed out".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Protocol(format!("uid store failed: {e}"))))?;
    let _: Vec<Fetch> = timeout(config.socket_timeout, stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("UID STORE stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("uid store stream failed: {e}"))))?;
    Ok(())
}

/// Expunge all messages marked `\Deleted`
pub async fn expunge(config: &MailConfig, session: &mut ImapSession) -> AppResult<()> {
    let stream = timeout(config.socket_timeout, session.expunge())
        .await
        .map_err(|_| AppError::Timeout("EXPUNGE timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("EXPUNGE failed: {e}"))))?;
    let _: Vec<u32> = timeout(config.socket_timeout, stream.try_collect())
        .await
        .map_err(|_| AppError::Timeout("EXPUNGE stream timed out".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Protocol(format!("EXPUNGE stream failed: {e}"))))?;
    Ok(())
}

/// Close the session with a best-effort LOGOUT
///
/// The operation's outcome is already decided by the time logout runs, so
/// failures are logged at debug level and swallowed.
pub async fn logout(config: &MailConfig, session: &mut ImapSession) {
    match timeout(config.greeting_timeout, session.logout()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("IMAP logout failed: {e}"),
        Err(_) => debug!("IMAP logout timed out"),
    }
}

/// Whether a fetch result carries `\Flagged`
pub fn is_flagged(fetch: &Fetch) -> bool {
    fetch.flags().any(|flag| matches!(flag, Flag::Flagged))
}
