//! Scripted SMTP server
//!
//! Plaintext submission endpoint that advertises AUTH, accepts every
//! recipient, and records both the command stream and DATA payloads.

use std::sync::{Arc, Mutex};

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use super::{read_line, write_all};

/// Everything the server saw
pub struct SmtpRecorder {
    /// Command lines in arrival order (EHLO, AUTH, MAIL, RCPT, ...)
    pub commands: Vec<String>,
    /// One entry per accepted DATA payload, dot-unstuffed
    pub messages: Vec<String>,
}

pub struct FakeSmtpServer {
    pub port: u16,
    pub state: Arc<Mutex<SmtpRecorder>>,
}

impl FakeSmtpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(SmtpRecorder {
            commands: Vec::new(),
            messages: Vec::new(),
        }));

        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(session(socket, Arc::clone(&shared)));
            }
        });

        Self { port, state }
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }
}

async fn session(socket: TcpStream, state: Arc<Mutex<SmtpRecorder>>) {
    let mut stream = BufReader::new(socket);
    if write_all(&mut stream, b"220 localhost ESMTP ready\r\n")
        .await
        .is_err()
    {
        return;
    }
    loop {
        let Some(line) = read_line(&mut stream).await else {
            return;
        };
        state.lock().unwrap().commands.push(line.clone());
        let upper = line.to_ascii_uppercase();

        let reply: Vec<u8> = if upper.starts_with("EHLO") || upper.starts_with("HELO") {
            b"250-localhost greets you\r\n250 AUTH PLAIN LOGIN\r\n".to_vec()
        } else if upper.starts_with("AUTH") {
            b"235 2.7.0 authentication successful\r\n".to_vec()
        } else if upper.starts_with("MAIL") || upper.starts_with("RCPT") {
            b"250 OK\r\n".to_vec()
        } else if upper.starts_with("DATA") {
            if write_all(&mut stream, b"354 end data with <CRLF>.<CRLF>\r\n")
                .await
                .is_err()
            {
                return;
            }
            let mut body = String::new();
            loop {
                let Some(data_line) = read_line(&mut stream).await else {
                    return;
                };
                if data_line == "." {
                    break;
                }
                let unstuffed = data_line.strip_prefix('.').map_or(data_line.as_str(), |r| r);
                body.push_str(unstuffed);
                body.push_str("\r\n");
            }
            state.lock().unwrap().messages.push(body);
            b"250 2.0.0 message accepted\r\n".to_vec()
        } else if upper.starts_with("QUIT") {
            let _ = write_all(&mut stream, b"221 2.0.0 bye\r\n").await;
            return;
        } else {
            b"250 OK\r\n".to_vec()
        };

        if write_all(&mut stream, &reply).await.is_err() {
            return;
        }
    }
}
