use std::fs::{self, File};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use super::browser_probe::RenderSession;
use super::config::BrowserSettings;
use super::error::WebDriverError;
use super::types::BrowserArg;

/// One W3C WebDriver session, plus the driver process when we started it
/// ourselves. Dropping the handle kills that process; `close` also deletes
/// the remote session first.
pub struct WebDriverSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    driver: Option<Child>,
}

impl WebDriverSession {
    pub async fn start(settings: &BrowserSettings) -> Result<Self, WebDriverError> {
        let (endpoint, driver) = match settings.webdriver_url.as_deref() {
            Some(url) => {
                let endpoint = url.trim_end_matches('/').to_string();
                if !webdriver_reachable(&endpoint) {
                    return Err(WebDriverError::Launch(format!(
                        "endpoint {endpoint} unreachable"
                    )));
                }
                info!(%endpoint, "using running webdriver endpoint");
                (endpoint, None)
            }
            None => {
                let (endpoint, child) = start_webdriver(settings).await?;
                info!(%endpoint, "webdriver autostarted");
                (endpoint, Some(child))
            }
        };

        let client = match reqwest::Client::builder()
            .timeout(settings.page_load_timeout + Duration::from_secs(15))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                stop_webdriver(driver);
                return Err(WebDriverError::Launch(format!(
                    "webdriver client build failed: {err}"
                )));
            }
        };

        let mut session = Self {
            client,
            endpoint,
            session_id: String::new(),
            driver,
        };
        session.session_id = session.create_session(settings).await?;
        if let Err(err) = session.set_timeouts(settings).await {
            warn!(error = %err, "webdriver rejected timeouts, closing session");
            session.close().await;
            return Err(err);
        }
        info!(
            session = %session.session_id,
            browser = ?settings.browser,
            headless = settings.headless,
            "webdriver session ready"
        );
        Ok(session)
    }

    /// Deletes the remote session and stops an autostarted driver.
    pub async fn close(mut self) {
        if !self.session_id.is_empty() {
            let path = format!("/session/{}", self.session_id);
            if let Err(err) = self
                .command("delete session", Method::DELETE, &path, None)
                .await
            {
                warn!(error = %err, "webdriver session delete failed");
            }
        }
        stop_webdriver(self.driver.take());
    }

    async fn create_session(&self, settings: &BrowserSettings) -> Result<String, WebDriverError> {
        let caps = webdriver_capabilities(settings);
        let value = self
            .command("session create", Method::POST, "/session", Some(caps))
            .await?;
        value
            .pointer("/sessionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| WebDriverError::Malformed {
                command: "session create",
                detail: format!(
                    "session id missing: {}",
                    truncate_for_log(&value.to_string(), 220)
                ),
            })
    }

    async fn set_timeouts(&self, settings: &BrowserSettings) -> Result<(), WebDriverError> {
        let path = format!("/session/{}/timeouts", self.session_id);
        let body = json!({
            "pageLoad": settings.page_load_timeout.as_millis() as u64,
            "implicit": settings.implicit_wait.as_millis() as u64,
        });
        self.command("set timeouts", Method::POST, &path, Some(body))
            .await
            .map(|_| ())
    }

    async fn command(
        &self,
        command: &'static str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.endpoint));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let res = request
            .send()
            .await
            .map_err(|e| WebDriverError::Transport {
                command,
                message: e.to_string(),
            })?;
        let status = res.status().as_u16();
        let body = res.text().await.map_err(|e| WebDriverError::Transport {
            command,
            message: format!("response read failed: {e}"),
        })?;
        parse_webdriver_response(command, status, &body)
    }

    async fn string_command(
        &self,
        command: &'static str,
        leaf: &str,
    ) -> Result<String, WebDriverError> {
        let path = format!("/session/{}/{leaf}", self.session_id);
        let value = self.command(command, Method::GET, &path, None).await?;
        match value {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(WebDriverError::Malformed {
                command,
                detail: format!(
                    "expected string, got {}",
                    truncate_for_log(&other.to_string(), 120)
                ),
            }),
        }
    }
}

impl RenderSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), WebDriverError> {
        let path = format!("/session/{}/url", self.session_id);
        self.command("navigate", Method::POST, &path, Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn title(&mut self) -> Result<String, WebDriverError> {
        self.string_command("get title", "title").await
    }

    async fn page_source(&mut self) -> Result<String, WebDriverError> {
        self.string_command("get source", "source").await
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        stop_webdriver(self.driver.take());
    }
}

/// Unwraps the W3C `{"value": ...}` envelope. A `value.error` wins over the
/// HTTP status because drivers report failures as 4xx/5xx with that body.
fn parse_webdriver_response(
    command: &'static str,
    status: u16,
    body: &str,
) -> Result<Value, WebDriverError> {
    let parsed: Value = serde_json::from_str(body).unwrap_or_default();
    if let Some(error) = parsed.pointer("/value/error").and_then(|v| v.as_str()) {
        let message = parsed
            .pointer("/value/message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown webdriver error");
        return Err(WebDriverError::Protocol {
            error: error.to_string(),
            message: message.to_string(),
        });
    }
    if !(200..300).contains(&status) {
        return Err(WebDriverError::Status {
            command,
            status,
            body: truncate_for_log(body, 240),
        });
    }
    match parsed {
        Value::Object(mut map) => Ok(map.remove("value").unwrap_or(Value::Null)),
        _ => Err(WebDriverError::Malformed {
            command,
            detail: truncate_for_log(body, 220),
        }),
    }
}

fn webdriver_capabilities(settings: &BrowserSettings) -> Value {
    let binary = settings
        .browser_binary
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| detect_browser_binary(settings.browser));

    match settings.browser {
        BrowserArg::Firefox => {
            let mut args = Vec::<String>::new();
            if settings.headless {
                args.push("-headless".to_string());
            }
            args.push("--width=1920".to_string());
            args.push("--height=1080".to_string());
            let mut firefox_options = json!({
                "args": args,
                "prefs": {
                    "dom.webdriver.enabled": false,
                    "useAutomationExtension": false
                }
            });
            if let Some(binary) = binary {
                firefox_options["binary"] = json!(binary.to_string_lossy().to_string());
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "firefox",
                        "acceptInsecureCerts": true,
                        "moz:firefoxOptions": firefox_options
                    }
                }
            })
        }
        BrowserArg::Chrome => {
            let mut args = Vec::<String>::new();
            if settings.headless {
                args.push("--headless=new".to_string());
            }
            args.push("--no-sandbox".to_string());
            args.push("--disable-dev-shm-usage".to_string());
            args.push("--window-size=1920,1080".to_string());
            let mut chrome_options = json!({ "args": args });
            if let Some(binary) = binary {
                chrome_options["binary"] = json!(binary.to_string_lossy().to_string());
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": "chrome",
                        "acceptInsecureCerts": true,
                        "goog:chromeOptions": chrome_options
                    }
                }
            })
        }
    }
}

fn detect_browser_binary(browser: BrowserArg) -> Option<PathBuf> {
    match browser {
        BrowserArg::Firefox => {
            if let Ok(v) = std::env::var("FIREFOX_BIN") {
                let p = PathBuf::from(v);
                if p.exists() {
                    return Some(p);
                }
            }
            // CI images ship the ESR build under this name.
            which_binary_path("firefox-esr").or_else(|| which_binary_path("firefox"))
        }
        BrowserArg::Chrome => {
            if let Ok(v) = std::env::var("CHROME_BIN") {
                let p = PathBuf::from(v);
                if p.exists() {
                    return Some(p);
                }
            }
            which_binary_path("google-chrome")
                .or_else(|| which_binary_path("chromium"))
                .or_else(|| which_binary_path("chrome"))
        }
    }
}

fn which_binary_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8(output.stdout).ok()?;
    let p = PathBuf::from(path.trim());
    if p.exists() { Some(p) } else { None }
}

async fn start_webdriver(settings: &BrowserSettings) -> Result<(String, Child), WebDriverError> {
    let driver_binary = settings
        .webdriver_binary
        .clone()
        .unwrap_or_else(|| settings.browser.default_driver_binary().to_string());
    let port = find_free_local_port()?;
    let endpoint = format!("http://127.0.0.1:{port}");
    let log_path = std::env::temp_dir().join(format!("linkprobe-webdriver-{port}.log"));

    let mut cmd = Command::new(&driver_binary);
    configure_webdriver_command(&mut cmd, &driver_binary, port);
    let log_file = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .map_err(|e| {
            WebDriverError::Launch(format!(
                "failed to open webdriver log {}: {e}",
                log_path.display()
            ))
        })?;
    let log_file_err = log_file
        .try_clone()
        .map_err(|e| WebDriverError::Launch(format!("failed to clone webdriver log handle: {e}")))?;
    cmd.stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .stdin(Stdio::null());

    let mut child = cmd
        .spawn()
        .map_err(|e| WebDriverError::Launch(format!("failed to spawn {driver_binary}: {e}")))?;
    debug!(binary = %driver_binary, %endpoint, log = %log_path.display(), "webdriver spawned");

    let steps = (settings.webdriver_start_timeout.as_millis() / 200).max(1);
    for _ in 0..steps {
        if webdriver_reachable(&endpoint) {
            return Ok((endpoint, child));
        }
        if let Ok(Some(status)) = child.try_wait() {
            let mut message = format!(
                "{driver_binary} exited early with status {status} (log: {})",
                log_path.display()
            );
            if let Some(tail) = read_log_tail(&log_path, 30) {
                message = format!("{message}; tail: {tail}");
            }
            return Err(WebDriverError::Launch(message));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let _ = child.kill();
    let _ = child.wait();
    let mut message = format!(
        "{driver_binary} did not become ready in time (log: {})",
        log_path.display()
    );
    if let Some(tail) = read_log_tail(&log_path, 30) {
        message = format!("{message}; tail: {tail}");
    }
    Err(WebDriverError::Launch(message))
}

fn configure_webdriver_command(cmd: &mut Command, bin: &str, port: u16) {
    let lower = bin.to_ascii_lowercase();
    if lower.contains("geckodriver") {
        cmd.arg("--port").arg(port.to_string());
        return;
    }
    cmd.arg(format!("--port={port}"));
    if lower.contains("chromedriver") {
        cmd.arg("--log-level=SEVERE");
    }
}

fn webdriver_reachable(endpoint: &str) -> bool {
    let Ok(parsed) = Url::parse(endpoint) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let port = parsed.port_or_known_default().unwrap_or(4444);
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
}

fn stop_webdriver(child: Option<Child>) {
    if let Some(mut c) = child {
        let _ = c.kill();
        let _ = c.wait();
    }
}

fn find_free_local_port() -> Result<u16, WebDriverError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| WebDriverError::Launch(format!("free port bind failed: {e}")))?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| WebDriverError::Launch(format!("local addr failed: {e}")))
}

fn read_log_tail(path: &Path, lines: usize) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let mut tail = text.lines().rev().take(lines.max(1)).collect::<Vec<_>>();
    tail.reverse();
    let tail = tail.join(" | ");
    if tail.is_empty() { None } else { Some(tail) }
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}
