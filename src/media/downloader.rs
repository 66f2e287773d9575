use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Human-readable name of the downloader
    fn name(&self) -> &'static str;

    /// Download the media behind `url` into the file at `destination`
    async fn download(&self, url: &str, destination: &Path) -> Result<()>;

    /// Test if this downloader is available on the system
    async fn test_availability(&self) -> bool;
}
