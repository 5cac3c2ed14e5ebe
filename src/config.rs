//! Configuration module for the mailbox account and server settings
//!
//! All configuration is loaded from environment variables at startup. The
//! resulting [`MailConfig`] is immutable for the lifetime of the process;
//! backend selection (POP3 vs IMAP) happens exactly once, from this snapshot.

use std::env;
use std::env::VarError;
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::{AppError, AppResult};

/// Mailbox account and server configuration
///
/// Holds connection details and credentials for the single configured mail
/// account. The POP3/IMAP and SMTP services are assumed to live on the same
/// host and share credentials. Passwords are stored using `SecretString` to
/// prevent accidental logging.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Mail server hostname, shared by POP3/IMAP and SMTP
    pub host: String,
    /// Username for authentication, also used as the SMTP From address
    pub user: String,
    /// Password stored in a type that prevents accidental logging
    pub password: SecretString,
    /// POP3 port, used when no IMAP port is configured
    pub pop_port: u16,
    /// IMAP port; setting it selects the IMAP backend over POP3
    pub imap_port: Option<u16>,
    /// SMTP submission port
    pub smtp_port: u16,
    /// Whether mailbox connections use implicit TLS on their port
    pub ssl: bool,
    /// Whether to accept self-signed or otherwise invalid server certificates
    pub allow_self_signed: bool,
    /// Whether a plaintext SMTP session is permitted when STARTTLS is absent
    pub smtp_allow_plaintext: bool,
    /// TCP connection timeout
    pub connect_timeout: Duration,
    /// Server greeting / TLS handshake timeout
    pub greeting_timeout: Duration,
    /// Timeout for individual protocol exchanges on an open connection
    pub socket_timeout: Duration,
}

impl MailConfig {
    /// Load all configuration from environment variables
    ///
    /// `MAIL_HOST`, `MAIL_USER`, and `MAIL_PASS` are required. The mailbox
    /// backend is POP3 on `MAIL_POP_PORT` (default 110) unless
    /// `MAIL_IMAP_PORT` is set, in which case IMAP is used on that port.
    ///
    /// # Errors
    ///
    /// Returns `Config` if required environment variables are missing
    /// or malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// MAIL_HOST=mail.example.com
    /// MAIL_USER=user@example.com
    /// MAIL_PASS=app-password
    /// MAIL_IMAP_PORT=993
    /// MAIL_SMTP_PORT=587
    /// MAIL_SSL=1
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        Ok(Self {
            host: required_env("MAIL_HOST")?,
            user: required_env("MAIL_USER")?,
            password: SecretString::new(required_env("MAIL_PASS")?.into()),
            pop_port: parse_u16_env("MAIL_POP_PORT", 110)?,
            imap_port: parse_opt_u16_env("MAIL_IMAP_PORT")?,
            smtp_port: parse_u16_env("MAIL_SMTP_PORT", 587)?,
            ssl: parse_bool_env("MAIL_SSL", true)?,
            allow_self_signed: parse_bool_env("MAIL_ALLOW_SELF_SIGNED", false)?,
            smtp_allow_plaintext: parse_bool_env("MAIL_SMTP_ALLOW_PLAINTEXT", false)?,
            connect_timeout: Duration::from_millis(parse_u64_env(
                "MAIL_CONNECT_TIMEOUT_MS",
                30_000,
            )?),
            greeting_timeout: Duration::from_millis(parse_u64_env(
                "MAIL_GREETING_TIMEOUT_MS",
                15_000,
            )?),
            socket_timeout: Duration::from_millis(parse_u64_env(
                "MAIL_SOCKET_TIMEOUT_MS",
                300_000,
            )?),
        })
    }

    /// Whether the mailbox backend is IMAP rather than POP3
    pub fn use_imap(&self) -> bool {
        self.imap_port.is_some()
    }

    /// Port of the selected mailbox backend
    pub fn mailbox_port(&self) -> u16 {
        self.imap_port.unwrap_or(self.pop_port)
    }
}

/// Read a required environment variable, returning error if missing or empty
fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Config(format!(
            "missing required environment variable {key}"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `Config` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::Config(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::Config(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u16` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `Config` if the variable is set but not a valid `u16`.
fn parse_u16_env(key: &str, default: u16) -> AppResult<u16> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u16>().map_err(|_| {
            AppError::Config(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::Config(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse an optional `u16` environment variable
///
/// Returns `None` if unset or blank; anything else must be a valid `u16`.
///
/// # Errors
///
/// Returns `Config` if the variable is set but not a valid `u16`.
fn parse_opt_u16_env(key: &str) -> AppResult<Option<u16>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => v.trim().parse::<u16>().map(Some).map_err(|_| {
            AppError::Config(format!("invalid u16 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::Config(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `Config` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<u64>().map_err(|_| {
            AppError::Config(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::Config(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}
