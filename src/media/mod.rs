mod downloader;
mod ytdlp;

pub use downloader::Downloader;
pub use ytdlp::YtDlpDownloader;

use crate::utils::StepOutcome;
use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

/// Single-attempt media fetcher in front of one [`Downloader`].
pub struct MediaFetcher {
    downloader: Box<dyn Downloader>,
}

impl MediaFetcher {
    pub fn new(downloader: Box<dyn Downloader>) -> Self {
        info!("Media fetcher initialized with {}", downloader.name());
        Self { downloader }
    }

    /// Downloads `url` into `destination`. Errors are logged and returned as
    /// [`StepOutcome::Failed`], never propagated.
    pub async fn fetch(&self, url: &str, destination: &Path) -> StepOutcome {
        info!("Starting download for URL: {}", url);

        match self.downloader.download(url, destination).await {
            Ok(()) => {
                info!("Successfully downloaded with {}", self.downloader.name());
                StepOutcome::Completed
            }
            Err(e) => {
                warn!("{} failed: {:#}", self.downloader.name(), e);
                StepOutcome::failed(format!("{e:#}"))
            }
        }
    }

    pub async fn test_setup(&self) -> Result<()> {
        info!("Testing media downloader setup...");

        if self.downloader.test_availability().await {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "{} is not available. Please install it or set YTDLP_BINARY.",
                self.downloader.name()
            ))
        }
    }
}
