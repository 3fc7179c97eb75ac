use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::config::CheckerConfig;
use super::error::SetupError;
use super::types::ProbeOutcome;

/// Redirect hops followed before the request counts as failed.
pub const MAX_REDIRECTS: usize = 30;

/// First-tier probe. Implementations must absorb every failure into an
/// inconclusive outcome.
pub trait PageProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(config: &CheckerConfig) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .default_headers(header_map(&config.headers))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageProbe for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(%url, error = %err, "http request failed");
                return ProbeOutcome::inconclusive();
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(%url, error = %err, "http body read failed");
                return ProbeOutcome::inconclusive();
            }
        };

        ProbeOutcome {
            http_status: Some(status),
            title: extract_title(&body),
        }
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let parsed = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        );
        match parsed {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid request header"),
        }
    }
    map
}

/// Trimmed text of the document's first `<title>`, or empty.
pub fn extract_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    let selector = match Selector::parse("title") {
        Ok(s) => s,
        Err(_) => return String::new(),
    };

    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}
