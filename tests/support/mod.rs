//! Shared fixtures for the integration suites
//!
//! The fakes in the submodules speak just enough POP3, IMAP, and SMTP to
//! drive the real clients over loopback sockets. Every server records the
//! command lines it receives so tests can assert on protocol behavior.
#![allow(dead_code)]

pub mod pop3;
pub mod smtp;

use std::sync::Arc;
use std::time::Duration;

use plain_mail_mcp_rs::config::MailConfig;
use secrecy::SecretString;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::TlsAcceptor;

/// Install the process-wide rustls crypto provider
///
/// Safe to call from every test; only the first call takes effect.
pub fn init_crypto() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .ok();
}

/// Configuration pointing every protocol at loopback test servers
pub fn local_config(
    pop_port: u16,
    imap_port: Option<u16>,
    smtp_port: u16,
    ssl: bool,
) -> MailConfig {
    MailConfig {
        host: "localhost".to_owned(),
        user: "user@example.com".to_owned(),
        password: SecretString::from("secret".to_owned()),
        pop_port,
        imap_port,
        smtp_port,
        ssl,
        allow_self_signed: true,
        smtp_allow_plaintext: true,
        connect_timeout: Duration::from_secs(5),
        greeting_timeout: Duration::from_secs(5),
        socket_timeout: Duration::from_secs(5),
    }
}

/// TLS acceptor backed by a fresh self-signed certificate
pub fn tls_acceptor() -> TlsAcceptor {
    init_crypto();
    let cert = rcgen::generate_simple_self_signed(vec![
        "localhost".to_owned(),
        "127.0.0.1".to_owned(),
    ])
    .unwrap();
    let key = rustls_pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert.der().clone()], key.into())
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Read one line, stripped of its CRLF; `None` when the peer closed
pub async fn read_line<S>(stream: &mut BufReader<S>) -> Option<String>
where
    S: AsyncRead + Unpin,
{
    let mut line = String::new();
    let n = stream.read_line(&mut line).await.ok()?;
    if n == 0 {
        None
    } else {
        Some(line.trim_end_matches(['\r', '\n']).to_owned())
    }
}

/// Write and flush a full reply
pub async fn write_all<S>(stream: &mut BufReader<S>, bytes: &[u8]) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Bytes of the header block including the blank separator line
pub fn header_section(raw: &[u8]) -> &[u8] {
    raw.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map_or(raw, |pos| &raw[..pos + 4])
}
