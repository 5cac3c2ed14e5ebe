//! plain-mail-mcp-rs: POP3/IMAP/SMTP mailbox MCP server over stdio
//!
//! This crate exposes a plain mailbox via the Model Context Protocol (MCP)
//! over stdio. The mailbox backend is chosen once at startup: IMAP when
//! `MAIL_IMAP_PORT` is set, POP3 otherwise. Outbound mail always goes
//! through SMTP submission.
//!
//! # Architecture
//!
//! - [`config`]: Environment-driven configuration for the mail account
//! - [`errors`]: Application error model with MCP error mapping
//! - [`tls`]: Shared rustls client configuration for POP3/IMAP connections
//! - [`pop3`]: Minimal async POP3 client with timeout wrappers
//! - [`imap`]: IMAP transport/session operations with timeout wrappers
//! - [`smtp`]: Outbound SMTP submission via lettre
//! - [`mailbox`]: Backend selection and the [`mailbox::MessageStore`] trait
//! - [`server`]: MCP tool handlers with validation and business orchestration
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`mime`]: Header parsing and message summary extraction

pub mod config;
pub mod errors;
pub mod imap;
pub mod mailbox;
pub mod mime;
pub mod models;
pub mod pop3;
pub mod server;
pub mod smtp;
pub mod tls;
