use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to a WebDriver endpoint or launching the driver.
#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("{command} request failed: {message}")]
    Transport {
        command: &'static str,
        message: String,
    },

    #[error("{command} HTTP {status}: {body}")]
    Status {
        command: &'static str,
        status: u16,
        body: String,
    },

    #[error("{error}: {message}")]
    Protocol { error: String, message: String },

    #[error("{command} returned a malformed response: {detail}")]
    Malformed {
        command: &'static str,
        detail: String,
    },

    #[error("webdriver launch failed: {0}")]
    Launch(String),
}

/// Run-level failures. Any of these ends the run before results are written.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("input file not found at {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("sheet '{sheet}' not found in {}", path.display())]
    MissingSheet { sheet: String, path: PathBuf },

    #[error("column '{column}' not found in {}", path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("unsupported input layout in {}: {detail}", path.display())]
    InputLayout { path: PathBuf, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http client build failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("webdriver unavailable: {0}")]
    WebDriver(#[from] WebDriverError),
}
