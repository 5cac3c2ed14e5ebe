//! SMTP message construction and submission
//!
//! Builds plain-text messages with `lettre` and submits them over a fresh
//! `AsyncSmtpTransport` per call. The delivery envelope is constructed
//! explicitly (To + CC + BCC) and the message is sent via `send_raw`, so BCC
//! recipients never appear in any header written into the message.

use std::sync::Arc;

use lettre::address::Envelope;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tokio::time::timeout;
use tracing::warn;

use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use crate::models::SendEmailInput;

/// SMTP submission handle
///
/// Builds a fresh transport for every send; there is no pooling and no
/// connection reuse.
#[derive(Clone)]
pub struct SmtpMailer {
    config: Arc<MailConfig>,
}

impl SmtpMailer {
    pub fn new(config: Arc<MailConfig>) -> Self {
        Self { config }
    }

    /// Send a plain-text message
    ///
    /// Returns the number of envelope recipients on success. Delivery is
    /// all-or-nothing; any failure fails the whole call.
    pub async fn send(&self, input: &SendEmailInput) -> AppResult<usize> {
        let (envelope, message) = build_message(&self.config, input)?;
        let recipients = envelope.to().len();

        let mailer = self.transport()?;
        timeout(
            self.config.socket_timeout,
            mailer.send_raw(&envelope, &message.formatted()),
        )
        .await
        .map_err(|_| AppError::Timeout("SMTP delivery timed out".to_owned()))
        .and_then(|r| r.map_err(map_smtp_error))?;
        Ok(recipients)
    }

    fn transport(&self) -> AppResult<AsyncSmtpTransport<Tokio1Executor>> {
        let config = &self.config;
        let credentials = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().to_owned(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
            .port(config.smtp_port)
            .credentials(credentials)
            .tls(self.tls_mode()?)
            .timeout(Some(config.socket_timeout))
            .build();
        Ok(mailer)
    }

    /// Derive the lettre TLS mode from `ssl` and the submission port
    ///
    /// Port 465 is wrapper TLS; any other port requires STARTTLS. The
    /// opportunistic downgrade exists only behind the logged
    /// `MAIL_SMTP_ALLOW_PLAINTEXT` opt-in.
    fn tls_mode(&self) -> AppResult<Tls> {
        let config = &self.config;
        if !config.ssl {
            return Ok(Tls::None);
        }
        let params = self.tls_parameters()?;
        if config.smtp_port == 465 {
            Ok(Tls::Wrapper(params))
        } else if config.smtp_allow_plaintext {
            warn!("SMTP STARTTLS downgrade enabled; delivery may fall back to plaintext");
            Ok(Tls::Opportunistic(params))
        } else {
            Ok(Tls::Required(params))
        }
    }

    fn tls_parameters(&self) -> AppResult<TlsParameters> {
        let mut builder = TlsParameters::builder(self.config.host.clone());
        if self.config.allow_self_signed {
            builder = builder.dangerous_accept_invalid_certs(true);
        }
        builder
            .build()
            .map_err(|e| AppError::Transport(format!("SMTP TLS configuration failed: {e}")))
    }
}

/// Build the message and its delivery envelope
///
/// The From mailbox is the configured login user. CC addresses appear both
/// in the envelope and the Cc header; BCC addresses only in the envelope.
pub fn build_message(
    config: &MailConfig,
    input: &SendEmailInput,
) -> AppResult<(Envelope, Message)> {
    let from: Mailbox = config
        .user
        .parse()
        .map_err(|e| AppError::Config(format!("MAIL_USER is not a valid From address: {e}")))?;
    let to = parse_mailbox(&input.to)?;
    let cc = parse_mailbox_list(&input.cc)?;
    let bcc = parse_mailbox_list(&input.bcc)?;

    let mut recipients: Vec<Address> = vec![to.email.clone()];
    recipients.extend(cc.iter().map(|mailbox| mailbox.email.clone()));
    recipients.extend(bcc.iter().map(|mailbox| mailbox.email.clone()));
    let envelope = Envelope::new(Some(from.email.clone()), recipients)
        .map_err(|e| AppError::InvalidInput(format!("invalid envelope: {e}")))?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(input.subject.as_str());
    for mailbox in cc {
        builder = builder.cc(mailbox);
    }
    let message = builder
        .body(input.body.clone())
        .map_err(|e| AppError::InvalidInput(format!("cannot build message: {e}")))?;

    Ok((envelope, message))
}

/// Parse one address as a mailbox
fn parse_mailbox(value: &str) -> AppResult<Mailbox> {
    let trimmed = value.trim();
    trimmed
        .parse()
        .map_err(|e| AppError::InvalidInput(format!("invalid address '{trimmed}': {e}")))
}

/// Parse a comma-separated address list, dropping empty entries
fn parse_mailbox_list(value: &str) -> AppResult<Vec<Mailbox>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|e| AppError::InvalidInput(format!("invalid address '{part}': {e}")))
        })
        .collect()
}

/// Map lettre SMTP errors onto the application taxonomy
fn map_smtp_error(e: lettre::transport::smtp::Error) -> AppError {
    let msg = e.to_string();
    if msg.to_ascii_lowercase().contains("auth") {
        AppError::AuthFailed(msg)
    } else if e.is_permanent() || e.is_transient() {
        AppError::Protocol(format!("SMTP delivery failed: {msg}"))
    } else {
        AppError::Transport(format!("SMTP delivery failed: {msg}"))
    }
}
