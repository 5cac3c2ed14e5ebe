//! Minimal async POP3 protocol client
//!
//! Hand-built over tokio streams: greeting, USER/PASS, STAT, TOP, RETR,
//! DELE, QUIT with `+OK`/`-ERR` status parsing, multiline termination, and
//! dot-unstuffing. Responses are read as bytes because header lines are not
//! guaranteed to be UTF-8.

use std::time::Duration;

use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::MailConfig;
use crate::errors::{AppError, AppResult};
use crate::tls;

/// Stream requirements for a POP3 connection (plain TCP or TLS)
trait Pop3Stream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> Pop3Stream for T {}

/// Authenticated POP3 session over a single connection
///
/// Created by [`connect_authenticated`]. Commands run under the configured
/// socket timeout. The TRANSACTION-state deletes issued via [`Pop3Session::dele`]
/// only commit when [`Pop3Session::quit`] completes cleanly.
pub struct Pop3Session {
    stream: BufReader<Box<dyn Pop3Stream>>,
    socket_timeout: Duration,
}

/// Connect to the POP3 server and authenticate
///
/// Performs the full connection sequence with timeouts:
/// 1. TCP connect
/// 2. Implicit TLS handshake when `ssl` is enabled
/// 3. Read `+OK` greeting
/// 4. USER/PASS authentication
///
/// # Errors
///
/// - `Timeout` if any connection phase times out
/// - `AuthFailed` if the server rejects USER or PASS
/// - `Transport` for TCP or TLS failures
/// - `Protocol` if the greeting is not `+OK`
pub async fn connect_authenticated(config: &MailConfig) -> AppResult<Pop3Session> {
    let stream = open_stream(config).await?;
    let mut session = Pop3Session {
        stream: BufReader::new(stream),
        socket_timeout: config.socket_timeout,
    };

    let greeting = session
        .read_response_line(config.greeting_timeout, "POP3 greeting")
        .await?;
    check_ok(&greeting, "POP3 greeting")?;

    session.login(config).await?;
    Ok(session)
}

/// Open the transport stream per the configured security mode
async fn open_stream(config: &MailConfig) -> AppResult<Box<dyn Pop3Stream>> {
    let tcp = timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.pop_port)),
    )
    .await
    .map_err(|_| AppError::Timeout("tcp connect timeout".to_owned()))
    .and_then(|r| r.map_err(|e| AppError::Transport(format!("tcp connect failed: {e}"))))?;

    if !config.ssl {
        return Ok(Box::new(tcp));
    }

    let connector = tls::connector(config.allow_self_signed);
    let server_name = tls::server_name(&config.host)?;
    let tls_stream = timeout(config.greeting_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| AppError::Timeout("TLS handshake timeout".to_owned()))
        .and_then(|r| r.map_err(|e| AppError::Transport(format!("TLS handshake failed: {e}"))))?;
    Ok(Box::new(tls_stream))
}

impl Pop3Session {
    /// Number of messages currently in the maildrop
    pub async fn stat(&mut self) -> AppResult<usize> {
        self.write_line(self.socket_timeout, "STAT", "STAT").await?;
        let line = self.read_response_line(self.socket_timeout, "STAT").await?;
        check_ok(&line, "STAT")?;
        parse_stat_count(&line)
    }

    /// Fetch the header block of one message (`TOP n 0`)
    pub async fn top(&mut self, msg: usize) -> AppResult<Vec<u8>> {
        let command = format!("TOP {msg} 0");
        self.write_line(self.socket_timeout, &command, "TOP").await?;
        let line = self.read_response_line(self.socket_timeout, "TOP").await?;
        check_message_ok(&line, msg)?;
        self.read_multiline("TOP").await
    }

    /// Fetch the full text of one message
    pub async fn retr(&mut self, msg: usize) -> AppResult<Vec<u8>> {
        let command = format!("RETR {msg}");
        self.write_line(self.socket_timeout, &command, "RETR").await?;
        let line = self.read_response_line(self.socket_timeout, "RETR").await?;
        check_message_ok(&line, msg)?;
        self.read_multiline("RETR").await
    }

    /// Mark one message as deleted
    ///
    /// The server defers removal until a clean QUIT.
    pub async fn dele(&mut self, msg: usize) -> AppResult<()> {
        let command = format!("DELE {msg}");
        self.write_line(self.socket_timeout, &command, "DELE").await?;
        let line = self.read_response_line(self.socket_timeout, "DELE").await?;
        check_message_ok(&line, msg)
    }

    /// End the session cleanly, committing any pending deletes
    pub async fn quit(&mut self) -> AppResult<()> {
        self.write_line(self.socket_timeout, "QUIT", "QUIT").await?;
        let line = self.read_response_line(self.socket_timeout, "QUIT").await?;
        check_ok(&line, "QUIT")
    }

    /// Authenticate with USER/PASS under the greeting deadline
    ///
    /// Error messages carry the server's response line, never the command
    /// that was sent.
    async fn login(&mut self, config: &MailConfig) -> AppResult<()> {
        let limit = config.greeting_timeout;

        let user = format!("USER {}", config.user);
        self.write_line(limit, &user, "USER").await?;
        let line = self.read_response_line(limit, "USER").await?;
        check_auth_ok(&line)?;

        let pass = format!("PASS {}", config.password.expose_secret());
        self.write_line(limit, &pass, "PASS").await?;
        let line = self.read_response_line(limit, "PASS").await?;
        check_auth_ok(&line)
    }

    /// Write one CRLF-terminated command line
    async fn write_line(&mut self, limit: Duration, line: &str, context: &str) -> AppResult<()> {
        let framed = format!("{line}\r\n");
        timeout(limit, async {
            self.stream.write_all(framed.as_bytes()).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| AppError::Timeout(format!("{context} write timed out")))
        .and_then(|r| r.map_err(|e| AppError::Transport(format!("{context} write failed: {e}"))))
    }

    /// Read one status line, stripped of its CRLF
    async fn read_response_line(&mut self, limit: Duration, context: &str) -> AppResult<String> {
        let mut buf = Vec::new();
        let n = timeout(limit, self.stream.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| AppError::Timeout(format!("{context} timed out")))
            .and_then(|r| r.map_err(|e| AppError::Transport(format!("{context} read failed: {e}"))))?;
        if n == 0 {
            return Err(AppError::Transport("connection closed by server".to_owned()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    /// Read a multiline response body up to the termination octet
    ///
    /// Strips the terminator and undoes dot-stuffing on content lines.
    async fn read_multiline(&mut self, context: &str) -> AppResult<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = timeout(self.socket_timeout, self.stream.read_until(b'\n', &mut line))
                .await
                .map_err(|_| AppError::Timeout(format!("{context} timed out")))
                .and_then(|r| {
                    r.map_err(|e| AppError::Transport(format!("{context} read failed: {e}")))
                })?;
            if n == 0 {
                return Err(AppError::Transport("connection closed by server".to_owned()));
            }
            if line == b".\r\n" || line == b".\n" {
                return Ok(body);
            }
            if line.starts_with(b"..") {
                body.extend_from_slice(&line[1..]);
            } else {
                body.extend_from_slice(&line);
            }
        }
    }
}

/// Require a `+OK` status line
fn check_ok(line: &str, context: &str) -> AppResult<()> {
    if line.starts_with("+OK") {
        Ok(())
    } else {
        Err(AppError::Protocol(format!("{context} failed: {line}")))
    }
}

/// Require `+OK` for a per-message command, mapping `-ERR` to NotFound
fn check_message_ok(line: &str, msg: usize) -> AppResult<()> {
    if line.starts_with("+OK") {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("message {msg}: {line}")))
    }
}

/// Require `+OK` during authentication
fn check_auth_ok(line: &str) -> AppResult<()> {
    if line.starts_with("+OK") {
        Ok(())
    } else {
        Err(AppError::AuthFailed(format!("POP3 login rejected: {line}")))
    }
}

/// Parse the message count out of a `+OK count octets` STAT response
fn parse_stat_count(line: &str) -> AppResult<usize> {
    line.split_whitespace()
        .nth(1)
        .and_then(|count| count.parse::<usize>().ok())
        .ok_or_else(|| AppError::Protocol(format!("malformed STAT response: {line}")))
}
