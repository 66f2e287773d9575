use super::downloader::Downloader;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct YtDlpDownloader {
    binary: String,
    format: String,
}

impl YtDlpDownloader {
    pub fn new(binary: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
        }
    }

    fn command(&self, url: &str, destination: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--format")
            .arg(&self.format)
            .arg("--no-warnings")
            .arg("--output")
            .arg(output_template(destination))
            // url is caller-supplied and must never be read as an option
            .arg("--")
            .arg(url);
        command
    }
}

/// yt-dlp treats `%` in `--output` as a template field marker.
fn output_template(destination: &Path) -> String {
    destination.to_string_lossy().replace('%', "%%")
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        info!(
            "Downloading media with {} to {}",
            self.binary,
            destination.display()
        );

        let output = self
            .command(url, destination)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;

        debug!(
            "yt-dlp stdout: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "Media download failed ({}): {}",
                output.status,
                error.trim()
            ));
        }

        Ok(())
    }

    async fn test_availability(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout);
                    info!("✅ yt-dlp is available, version: {}", version.trim());
                    true
                } else {
                    warn!(
                        "❌ yt-dlp command failed ({}): {}",
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                    false
                }
            }
            Err(e) => {
                warn!("❌ yt-dlp not found at {}: {}", self.binary, e);
                false
            }
        }
    }
}
