//! Message header parsing and text decoding
//!
//! Parses RFC 822 header blocks using `mailparse`, which also decodes MIME
//! encoded-words into readable text. Body text is decoded with best-effort
//! character replacement so undecodable bytes are never fatal.

use mailparse::MailHeader;

use crate::errors::{AppError, AppResult};
use crate::models::MessageSummary;

/// Parse header bytes into key-value pairs
///
/// Values have MIME encoded-words decoded by `mailparse`.
pub fn parse_header_bytes(header_bytes: &[u8]) -> AppResult<Vec<(String, String)>> {
    let (headers, _) = mailparse::parse_headers(header_bytes)
        .map_err(|e| AppError::Protocol(format!("failed to parse message headers: {e}")))?;
    Ok(to_tuples(headers))
}

/// Get header value by case-insensitive key
///
/// Returns the first matching header.
pub fn header_value(headers: &[(String, String)], key: &str) -> Option<String> {
    headers
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case(key).then(|| v.clone()))
}

/// Build a message summary from a raw header block
///
/// Missing or unparseable headers yield empty strings rather than errors.
pub fn summary_from_headers(uid: String, header_bytes: &[u8], is_flagged: bool) -> MessageSummary {
    let headers = parse_header_bytes(header_bytes).unwrap_or_default();
    MessageSummary {
        uid,
        from: header_value(&headers, "from").unwrap_or_default(),
        subject: header_value(&headers, "subject").unwrap_or_default(),
        date: header_value(&headers, "date").unwrap_or_default(),
        is_flagged,
    }
}

/// Decode raw message bytes to text with replacement characters
pub fn decode_lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Convert mailparse headers to tuples
fn to_tuples(headers: Vec<MailHeader<'_>>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect()
}
