use std::time::Instant;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{info, warn};

use super::browser_probe::{BrowserProber, RenderSession};
use super::classify::Classifier;
use super::config::CheckerConfig;
use super::http_probe::PageProbe;
use super::types::{CheckResult, CheckStatus};

/// Offset used for `CHECKED_AT_IST` and timestamped output names.
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

pub fn ist_offset() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist_offset())
}

/// Runs the two-tier check for every URL, strictly one after another.
pub struct Checker<P> {
    light: P,
    deep: BrowserProber,
    classifier: Classifier,
}

impl<P: PageProbe> Checker<P> {
    pub fn new(light: P, config: &CheckerConfig) -> Self {
        let classifier = Classifier::from_config(config);
        Self {
            light,
            deep: BrowserProber::new(&config.browser, classifier.clone()),
            classifier,
        }
    }

    /// One result per URL, in input order. Per-URL failures are already
    /// absorbed by the probers, so this never stops early.
    pub async fn check_all<S: RenderSession>(
        &self,
        urls: &[String],
        session: &mut S,
    ) -> Vec<CheckResult> {
        let total = urls.len();
        let mut results = Vec::with_capacity(total);
        for (i, url) in urls.iter().enumerate() {
            info!("[{}/{}] checking {}", i + 1, total, url);
            results.push(self.check_one(url, session).await);
        }
        results
    }

    pub async fn check_one<S: RenderSession>(&self, url: &str, session: &mut S) -> CheckResult {
        let started = Instant::now();
        let checked_at = now_ist();

        let outcome = self.light.probe(url).await;
        let escalated = self
            .classifier
            .needs_deep_probe(outcome.http_status, &outcome.title);
        let (mut status, title) = if escalated {
            self.deep.probe(session, url).await
        } else {
            (CheckStatus::Active, outcome.title)
        };

        if self.classifier.is_bad_title(&title) {
            warn!(%url, %title, "blocked title detected, marking inactive");
            status = CheckStatus::Inactive;
        }

        let duration_secs = round_secs(started.elapsed().as_secs_f64());
        info!(
            "  -> {} | HTTP: {} | Title: {} | Time: {:.2}s",
            status,
            outcome
                .http_status
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string()),
            title.chars().take(80).collect::<String>(),
            duration_secs
        );

        CheckResult {
            url: url.to_string(),
            status,
            http_code: outcome.http_status,
            title,
            checked_at,
            duration_secs,
            escalated,
        }
    }
}

fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
