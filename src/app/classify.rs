use super::config::CheckerConfig;

/// Escalation and dead-title rules. Both checks are pure substring matches on
/// the lowercased title.
#[derive(Debug, Clone)]
pub struct Classifier {
    challenge_phrases: Vec<String>,
    bad_titles: Vec<String>,
}

impl Classifier {
    pub fn new(challenge_phrases: &[String], bad_titles: &[String]) -> Self {
        Self {
            challenge_phrases: challenge_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            bad_titles: bad_titles.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &CheckerConfig) -> Self {
        Self::new(&config.challenge_phrases, &config.bad_titles)
    }

    /// Whether the lightweight result is too weak to trust and the browser
    /// has to look at the page.
    pub fn needs_deep_probe(&self, http_status: Option<u16>, title: &str) -> bool {
        match http_status {
            None => return true,
            Some(code) if code >= 400 => return true,
            Some(_) => {}
        }
        if title.is_empty() {
            return true;
        }
        self.mentions_challenge(title)
    }

    pub fn is_bad_title(&self, title: &str) -> bool {
        if title.is_empty() {
            return false;
        }
        let lower = title.to_lowercase();
        self.bad_titles.iter().any(|bad| lower.contains(bad.as_str()))
    }

    /// Substring check against the challenge phrases. Used for titles and for
    /// rendered page markup alike.
    pub fn mentions_challenge(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.challenge_phrases
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&CheckerConfig::default())
    }
}
