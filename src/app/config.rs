use std::time::Duration;

use super::types::{BrowserArg, Cli};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:130.0) Gecko/20100101 Firefox/130.0";

pub const CHALLENGE_PHRASES: [&str; 7] = [
    "checking your browser",
    "please stand by",
    "verify you are human",
    "security check",
    "attention required",
    "cf-browser-verification",
    "cloudflare",
];

pub const BAD_TITLES: [&str; 2] = ["404 Not Found", "Access to the website is blocked"];

/// Tunables for a whole run. Built once from the command line and handed to
/// the probers and the orchestrator.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub http_timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub challenge_phrases: Vec<String>,
    pub bad_titles: Vec<String>,
    pub browser: BrowserSettings,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub page_load_timeout: Duration,
    pub implicit_wait: Duration,
    pub settle_delay: Duration,
    pub title_wait: Duration,
    pub title_poll_interval: Duration,
    pub error_chars: usize,
    pub headless: bool,
    pub browser: BrowserArg,
    pub browser_binary: Option<String>,
    pub webdriver_url: Option<String>,
    pub webdriver_binary: Option<String>,
    pub webdriver_start_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(30),
            implicit_wait: Duration::from_secs(3),
            settle_delay: Duration::from_millis(1500),
            title_wait: Duration::from_secs(10),
            title_poll_interval: Duration::from_millis(500),
            error_chars: 200,
            headless: true,
            browser: BrowserArg::Firefox,
            browser_binary: None,
            webdriver_url: None,
            webdriver_binary: None,
            webdriver_start_timeout: Duration::from_millis(12000),
        }
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            headers: default_headers(DEFAULT_USER_AGENT),
            challenge_phrases: CHALLENGE_PHRASES.iter().map(|p| p.to_string()).collect(),
            bad_titles: BAD_TITLES.iter().map(|t| t.to_string()).collect(),
            browser: BrowserSettings::default(),
        }
    }
}

impl CheckerConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let user_agent = cli.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        Self {
            http_timeout: Duration::from_secs(cli.http_timeout_secs.max(1)),
            headers: default_headers(user_agent),
            browser: BrowserSettings {
                page_load_timeout: Duration::from_secs(cli.browser_timeout_secs.max(1)),
                settle_delay: Duration::from_millis(cli.settle_ms),
                title_wait: Duration::from_secs(cli.title_wait_secs),
                error_chars: cli.error_chars,
                headless: cli.headless,
                browser: cli.webdriver_browser,
                browser_binary: cli.browser_binary.clone(),
                webdriver_url: cli.webdriver_url.clone(),
                webdriver_binary: cli.webdriver_binary.clone(),
                webdriver_start_timeout: Duration::from_millis(cli.webdriver_start_timeout_ms),
                ..BrowserSettings::default()
            },
            ..Self::default()
        }
    }
}

fn default_headers(user_agent: &str) -> Vec<(String, String)> {
    [
        ("User-Agent", user_agent),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.5"),
        ("Referer", "https://www.google.com/"),
        ("Connection", "keep-alive"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_carry_browser_like_headers() {
        let config = CheckerConfig::default();
        let names = config
            .headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            ["User-Agent", "Accept", "Accept-Language", "Referer", "Connection"]
        );
        assert_eq!(config.headers[0].1, DEFAULT_USER_AGENT);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn from_cli_applies_overrides() {
        let cli = Cli::try_parse_from([
            "linkprobe",
            "--http-timeout-secs",
            "3",
            "--browser-timeout-secs",
            "45",
            "--settle-ms",
            "0",
            "--error-chars",
            "500",
            "--user-agent",
            "probe/1.0",
            "--webdriver-browser",
            "chrome",
        ])
        .unwrap();
        let config = CheckerConfig::from_cli(&cli);
        assert_eq!(config.http_timeout, Duration::from_secs(3));
        assert_eq!(config.browser.page_load_timeout, Duration::from_secs(45));
        assert_eq!(config.browser.settle_delay, Duration::ZERO);
        assert_eq!(config.browser.error_chars, 500);
        assert_eq!(config.browser.browser, BrowserArg::Chrome);
        assert_eq!(config.headers[0].1, "probe/1.0");
        assert_eq!(config.bad_titles.len(), BAD_TITLES.len());
    }
}
