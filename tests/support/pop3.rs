//! Scripted POP3 server
//!
//! Serves a fixed maildrop over plaintext or implicit TLS. Delete marks are
//! held per session and committed only on QUIT; a connection that drops
//! without QUIT discards them, as the protocol requires.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;

use super::{header_section, read_line, tls_acceptor, write_all};

/// Maildrop state shared across sessions
pub struct Maildrop {
    /// Raw messages; index 0 is message number 1
    pub messages: Vec<Vec<u8>>,
    /// Every command line received, in order
    pub commands: Vec<String>,
    /// Reject the PASS command with `-ERR`
    pub reject_pass: bool,
}

pub struct FakePop3Server {
    pub port: u16,
    pub state: Arc<Mutex<Maildrop>>,
}

impl FakePop3Server {
    pub async fn start(tls: bool, messages: Vec<Vec<u8>>) -> Self {
        Self::start_with(tls, messages, false).await
    }

    pub async fn start_with(tls: bool, messages: Vec<Vec<u8>>, reject_pass: bool) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(Maildrop {
            messages,
            commands: Vec::new(),
            reject_pass,
        }));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            let acceptor = tls.then(tls_acceptor);
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&shared);
                match &acceptor {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            if let Ok(stream) = acceptor.accept(socket).await {
                                serve(stream, state).await;
                            }
                        });
                    }
                    None => {
                        tokio::spawn(serve(socket, state));
                    }
                }
            }
        });

        Self { port, state }
    }

    /// Commands received so far, across all sessions
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }
}

async fn serve<S>(stream: S, state: Arc<Mutex<Maildrop>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    // Marks never leave the session; dropping the connection discards them.
    let mut pending: HashSet<usize> = HashSet::new();
    if write_all(&mut stream, b"+OK POP3 server ready\r\n")
        .await
        .is_err()
    {
        return;
    }
    loop {
        let Some(line) = read_line(&mut stream).await else {
            return;
        };
        let reply = respond(&line, &state, &mut pending);
        if write_all(&mut stream, &reply).await.is_err() {
            return;
        }
        if line.eq_ignore_ascii_case("QUIT") {
            return;
        }
    }
}

fn respond(line: &str, state: &Arc<Mutex<Maildrop>>, pending: &mut HashSet<usize>) -> Vec<u8> {
    let mut md = state.lock().unwrap();
    md.commands.push(line.to_owned());

    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg: Option<usize> = parts.next().and_then(|t| t.parse().ok());

    match verb.as_str() {
        "USER" => b"+OK send PASS\r\n".to_vec(),
        "PASS" => {
            if md.reject_pass {
                b"-ERR [AUTH] invalid credentials\r\n".to_vec()
            } else {
                b"+OK maildrop locked\r\n".to_vec()
            }
        }
        "STAT" => {
            let count = md.messages.len() - pending.len();
            let octets: usize = (1..=md.messages.len())
                .filter_map(|n| message_at(&md, pending, n))
                .map(Vec::len)
                .sum();
            format!("+OK {count} {octets}\r\n").into_bytes()
        }
        "TOP" => match arg.and_then(|n| message_at(&md, pending, n)) {
            Some(raw) => multiline(header_section(raw)),
            None => b"-ERR no such message\r\n".to_vec(),
        },
        "RETR" => match arg.and_then(|n| message_at(&md, pending, n)) {
            Some(raw) => multiline(raw),
            None => b"-ERR no such message\r\n".to_vec(),
        },
        "DELE" => match arg {
            Some(n) if message_at(&md, pending, n).is_some() => {
                pending.insert(n);
                format!("+OK message {n} deleted\r\n").into_bytes()
            }
            _ => b"-ERR no such message\r\n".to_vec(),
        },
        "QUIT" => {
            commit_deletes(&mut md, pending);
            b"+OK bye\r\n".to_vec()
        }
        _ => b"-ERR unsupported command\r\n".to_vec(),
    }
}

fn message_at<'a>(md: &'a Maildrop, pending: &HashSet<usize>, n: usize) -> Option<&'a Vec<u8>> {
    if n >= 1 && n <= md.messages.len() && !pending.contains(&n) {
        Some(&md.messages[n - 1])
    } else {
        None
    }
}

fn commit_deletes(md: &mut Maildrop, pending: &mut HashSet<usize>) {
    let mut doomed: Vec<usize> = pending.drain().collect();
    doomed.sort_unstable_by(|a, b| b.cmp(a));
    for n in doomed {
        if n >= 1 && n <= md.messages.len() {
            md.messages.remove(n - 1);
        }
    }
}

/// Render a multiline response with dot-stuffing and the final `.` line
fn multiline(payload: &[u8]) -> Vec<u8> {
    let mut out = b"+OK follows\r\n".to_vec();
    for line in payload.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b".") {
            out.push(b'.');
        }
        out.extend_from_slice(line);
    }
    if !out.ends_with(b"\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
