use std::time::Duration;

use tracing::{debug, info};

use super::classify::Classifier;
use super::config::BrowserSettings;
use super::error::WebDriverError;
use super::types::CheckStatus;

pub const NAVIGATION_ERROR_PREFIX: &str = "Selenium error";
pub const NO_TITLE_PLACEHOLDER: &str = "No title found";
pub const CHALLENGE_PLACEHOLDER: &str = "Blocked by Cloudflare";

/// The slice of a rendering session the deep probe needs. Every call replaces
/// or reads the session's current page.
pub trait RenderSession {
    async fn navigate(&mut self, url: &str) -> Result<(), WebDriverError>;
    async fn title(&mut self) -> Result<String, WebDriverError>;
    async fn page_source(&mut self) -> Result<String, WebDriverError>;
}

pub struct BrowserProber {
    classifier: Classifier,
    settle_delay: Duration,
    title_wait: Duration,
    poll_interval: Duration,
    error_chars: usize,
}

impl BrowserProber {
    pub fn new(settings: &BrowserSettings, classifier: Classifier) -> Self {
        Self {
            classifier,
            settle_delay: settings.settle_delay,
            title_wait: settings.title_wait,
            poll_interval: settings.title_poll_interval.max(Duration::from_millis(10)),
            error_chars: settings.error_chars,
        }
    }

    pub async fn probe<S: RenderSession>(
        &self,
        session: &mut S,
        url: &str,
    ) -> (CheckStatus, String) {
        if let Err(err) = session.navigate(url).await {
            debug!(%url, error = %err, "browser navigation failed");
            return (
                CheckStatus::Inactive,
                format!(
                    "{NAVIGATION_ERROR_PREFIX}: {}",
                    truncate_chars(&err.to_string(), self.error_chars)
                ),
            );
        }
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if !self.wait_for_title(session).await {
            debug!(%url, wait = ?self.title_wait, "rendered title never appeared");
            return (CheckStatus::Active, NO_TITLE_PLACEHOLDER.to_string());
        }

        let title = session
            .title()
            .await
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        let page = session
            .page_source()
            .await
            .map(|p| p.to_lowercase())
            .unwrap_or_default();

        if title.is_empty() && self.classifier.mentions_challenge(&page) {
            info!(%url, "security challenge page detected");
            return (CheckStatus::Active, CHALLENGE_PLACEHOLDER.to_string());
        }

        (CheckStatus::Active, title)
    }

    /// Polls until the document title is non-blank. Read errors count as
    /// "not yet".
    async fn wait_for_title<S: RenderSession>(&self, session: &mut S) -> bool {
        let poll = async {
            loop {
                if let Ok(title) = session.title().await {
                    if !title.trim().is_empty() {
                        return;
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        tokio::time::timeout(self.title_wait, poll).await.is_ok()
    }
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}
