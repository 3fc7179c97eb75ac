use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use super::checker::Checker;
use super::config::CheckerConfig;
use super::data_io::{default_output_path, detect_data_format, load_urls, save_results};
use super::error::SetupError;
use super::http_probe::HttpProber;
use super::types::{CheckResult, CheckStatus, Cli, DataFormat};
use super::webdriver::WebDriverSession;

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "linkprobe=debug" } else { "linkprobe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_with(cli).await
}

pub async fn run_with(cli: Cli) -> anyhow::Result<()> {
    let outcome = check_input(cli).await;
    if let Err(err) = &outcome {
        error!("{err:#}");
    }
    outcome
}

async fn check_input(cli: Cli) -> anyhow::Result<()> {
    let urls = load_urls(Path::new(&cli.input), &cli.sheet, &cli.column)?;
    if urls.is_empty() {
        info!(input = %cli.input, "no URLs loaded, nothing to check");
        return Ok(());
    }
    info!(count = urls.len(), input = %cli.input, "loaded URLs");

    let fallback_format = DataFormat::from(cli.format);
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(fallback_format));
    let format = detect_data_format(&output, fallback_format);

    let config = CheckerConfig::from_cli(&cli);
    let prober = HttpProber::new(&config)?;
    let mut session = WebDriverSession::start(&config.browser)
        .await
        .map_err(SetupError::from)
        .context("browser session could not be started")?;

    let checker = Checker::new(prober, &config);
    let results = checker.check_all(&urls, &mut session).await;
    session.close().await;

    save_results(&results, Path::new(&output), format)
        .with_context(|| format!("failed to write results to {output}"))?;
    log_summary(&results, &output);
    Ok(())
}

fn log_summary(results: &[CheckResult], output: &str) {
    let active = results
        .iter()
        .filter(|r| r.status == CheckStatus::Active)
        .count();
    let escalated = results.iter().filter(|r| r.escalated).count();
    info!(
        "finished: total={} active={} inactive={} escalated={} output={}",
        results.len(),
        active,
        results.len() - active,
        escalated,
        output
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpListener;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use crate::app::test_support::{FakeDriverOptions, FakeWebDriver};

    fn closed_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn write_input(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("links.csv");
        fs::write(&path, content).unwrap();
        path
    }

    fn cli(input: &Path, output: &Path, webdriver_url: &str) -> Cli {
        Cli::try_parse_from([
            "linkprobe",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--webdriver-url",
            webdriver_url,
            "--settle-ms",
            "0",
            "--title-wait-secs",
            "2",
            "--http-timeout-secs",
            "2",
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn missing_input_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let cli = cli(&dir.path().join("links.csv"), &output, &closed_endpoint());

        let err = run_with(cli).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::InputNotFound(_))
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn unreachable_webdriver_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, "URL\nhttp://127.0.0.1:9/\n");
        let output = dir.path().join("out.csv");

        let err = run_with(cli(&input, &output, &closed_endpoint()))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("unreachable"));
        assert!(!output.exists());
    }

    // The endpoint is closed, so reaching the browser step would fail the run.
    #[tokio::test]
    async fn empty_url_list_never_starts_browser() {
        let dir = TempDir::new().unwrap();
        let input = write_input(&dir, "URL\n\n");
        let output = dir.path().join("out.csv");

        run_with(cli(&input, &output, &closed_endpoint()))
            .await
            .unwrap();
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn session_is_closed_before_results_are_saved() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let driver = FakeWebDriver::spawn(FakeDriverOptions {
            title: "Rendered Page".to_string(),
            watch: Some(output.clone()),
            ..FakeDriverOptions::default()
        })
        .await;
        // Nothing listens here, so the HTTP request fails and the URL escalates.
        let url = format!("{}/", closed_endpoint());
        let input = write_input(&dir, &format!("URL\n{url}\n"));

        run_with(cli(&input, &output, &driver.url)).await.unwrap();

        let requests = driver.requests();
        let delete = requests
            .iter()
            .find(|r| r.line == "DELETE /session/abc")
            .expect("session was not deleted");
        assert!(!delete.watched_exists);
        assert!(requests.iter().any(|r| r.line == "POST /session/abc/url"));

        let report = fs::read_to_string(&output).unwrap();
        let row = report.lines().nth(1).unwrap();
        assert!(row.starts_with(&format!("{url},Active,,Rendered Page,")));
    }
}
