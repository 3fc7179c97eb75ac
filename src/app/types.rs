use std::fmt;

use chrono::{DateTime, FixedOffset};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "linkprobe",
    version,
    about = "Checks URL liveness with a fast HTTP probe and a WebDriver fallback"
)]
pub struct Cli {
    #[arg(value_name = "INPUT", default_value = "links.xlsx")]
    pub input: String,

    #[arg(long, value_name = "NAME", default_value = "Links")]
    pub sheet: String,

    #[arg(long, value_name = "NAME", default_value = "URL")]
    pub column: String,

    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Xlsx)]
    pub format: FileFormatArg,

    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub browser_timeout_secs: u64,

    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub title_wait_secs: u64,

    #[arg(long, value_name = "MS", default_value_t = 1500)]
    pub settle_ms: u64,

    #[arg(long, value_name = "N", default_value_t = 200)]
    pub error_chars: usize,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    #[arg(
        long,
        env = "HEADLESS",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub headless: bool,

    #[arg(long, value_enum, default_value_t = BrowserArg::Firefox)]
    pub webdriver_browser: BrowserArg,

    #[arg(long, value_name = "URL")]
    pub webdriver_url: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub webdriver_binary: Option<String>,

    #[arg(long, env = "BROWSER_BINARY", value_name = "PATH")]
    pub browser_binary: Option<String>,

    #[arg(long, value_name = "MS", default_value_t = 12000)]
    pub webdriver_start_timeout_ms: u64,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum BrowserArg {
    Firefox,
    Chrome,
}

impl BrowserArg {
    pub fn default_driver_binary(self) -> &'static str {
        match self {
            BrowserArg::Firefox => "geckodriver",
            BrowserArg::Chrome => "chromedriver",
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FileFormatArg {
    Xlsx,
    Csv,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Xlsx,
    Csv,
    Json,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Xlsx => DataFormat::Xlsx,
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
        }
    }
}

impl DataFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DataFormat::Xlsx => "xlsx",
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
        }
    }
}

/// Final classification of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Active,
    Inactive,
}

impl CheckStatus {
    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Active => "Active",
            CheckStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the lightweight HTTP probe saw. `http_status` is `None` when the
/// request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeOutcome {
    pub http_status: Option<u16>,
    pub title: String,
}

impl ProbeOutcome {
    pub fn inconclusive() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub url: String,
    pub status: CheckStatus,
    pub http_code: Option<u16>,
    pub title: String,
    pub checked_at: DateTime<FixedOffset>,
    pub duration_secs: f64,
    pub escalated: bool,
}
