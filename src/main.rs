use anyhow::{Context, Result};
use clap::Parser;
use lambda_http::{service_fn, Request};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod api;
mod config;
mod media;
mod storage;
mod utils;

use api::{Gatekeeper, VideoHandler};
use config::Config;
use media::{MediaFetcher, YtDlpDownloader};
use storage::{Publisher, S3Store};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<String>,

    /// Check that the downloader is installed, then exit
    #[arg(long)]
    check: bool,
}

fn get_config_path(args: &Args) -> Option<String> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }

    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Some(path);
    }

    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        let config_path = format!("{}/clipstash/config.toml", xdg_config_home);
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let config_path = format!("{}/.config/clipstash/config.toml", home.display());
        if std::path::Path::new(&config_path).exists() {
            return Some(config_path);
        }
    }

    None
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if config.get_logging_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = get_config_path(&args);
    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load config from {}", path),
        None => "Failed to load config from environment".to_string(),
    })?;

    init_logging(&config);
    info!("Starting clipstash...");
    match &config_path {
        Some(path) => info!("Loaded config from: {}", path),
        None => info!("No config file found, using defaults and environment"),
    }

    let fetcher = MediaFetcher::new(Box::new(YtDlpDownloader::new(
        config.downloader.binary.clone(),
        config.downloader.format.clone(),
    )));

    if args.check {
        return fetcher.test_setup().await;
    }

    if let Err(e) = fetcher.test_setup().await {
        warn!("Media downloader test failed: {}", e);
    }

    let store = S3Store::from_config(&config.storage).await;
    let publisher = Publisher::new(Box::new(store), config.bucket().map(str::to_string));
    let gatekeeper = Gatekeeper::new(config.cors.allowed_origins.clone())?;

    let handler = Arc::new(VideoHandler::new(
        gatekeeper,
        fetcher,
        publisher,
        config.downloader.scratch_dir.clone(),
    ));

    lambda_http::run(service_fn(move |request: Request| {
        let handler = Arc::clone(&handler);
        async move { handler.handle(request).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
}
