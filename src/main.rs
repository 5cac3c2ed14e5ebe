//! plain-mail-mcp-rs: POP3/IMAP/SMTP mailbox MCP server over stdio
//!
//! Process entry point. See the library crate documentation for the module
//! layout; this binary only wires environment loading, logging, and the
//! stdio transport together.

use plain_mail_mcp_rs::config::MailConfig;
use plain_mail_mcp_rs::server::PlainMailServer;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. This process expects to be spawned by an MCP client
/// via `stdio` transport.
///
/// # Environment Variables
///
/// See [`MailConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// MAIL_HOST=mail.example.com \
/// MAIL_USER=user@example.com \
/// MAIL_PASS=secret \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // rustls allows exactly one process-wide crypto provider; both the IMAP
    // and SMTP clients rely on it being installed.
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .ok();

    let config = MailConfig::load_from_env()?;
    let service = PlainMailServer::new(config).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
