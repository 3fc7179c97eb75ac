use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const FAKE_SESSION_ID: &str = "abc";

#[derive(Debug, Clone, Default)]
pub struct FakeDriverOptions {
    pub reject_timeouts: bool,
    pub title: String,
    /// Recorded alongside every request: whether this path existed when the
    /// request arrived.
    pub watch: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub line: String,
    pub watched_exists: bool,
}

/// In-process W3C WebDriver endpoint with a single session.
pub struct FakeWebDriver {
    pub url: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeWebDriver {
    pub async fn spawn(options: FakeDriverOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let options = Arc::new(options);
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, options.clone(), log.clone()));
            }
        });
        Self {
            url: format!("http://{addr}"),
            seen,
        }
    }

    /// `METHOD /path` for every request, in arrival order.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.line).collect()
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    options: Arc<FakeDriverOptions>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
) {
    while let Some(line) = read_request(&mut stream).await {
        let watched_exists = options.watch.as_ref().is_some_and(|p| p.exists());
        seen.lock().unwrap().push(SeenRequest {
            line: line.clone(),
            watched_exists,
        });
        let (status, body) = route(&line, &options);
        let body = body.to_string();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn route(line: &str, options: &FakeDriverOptions) -> (&'static str, Value) {
    let session = format!("/session/{FAKE_SESSION_ID}");
    let ok_null = ("200 OK", json!({ "value": null }));
    match line.split_once(' ') {
        Some(("POST", "/session")) => (
            "200 OK",
            json!({ "value": { "sessionId": FAKE_SESSION_ID, "capabilities": {} } }),
        ),
        Some(("POST", path)) if path == format!("{session}/timeouts") => {
            if options.reject_timeouts {
                (
                    "400 Bad Request",
                    json!({ "value": { "error": "invalid argument", "message": "timeouts rejected" } }),
                )
            } else {
                ok_null
            }
        }
        Some(("POST", path)) if path == format!("{session}/url") => ok_null,
        Some(("GET", path)) if path == format!("{session}/title") => {
            ("200 OK", json!({ "value": options.title }))
        }
        Some(("GET", path)) if path == format!("{session}/source") => {
            ("200 OK", json!({ "value": "<html><body>ok</body></html>" }))
        }
        Some(("DELETE", path)) if path == session => ok_null,
        _ => (
            "404 Not Found",
            json!({ "value": { "error": "unknown command", "message": line } }),
        ),
    }
}

/// Reads one request (head and body) and returns `METHOD /path`.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let body_len = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut parts = head.lines().next()?.split_whitespace();
    Some(format!("{} {}", parts.next()?, parts.next()?))
}
