use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, R2, ...)
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DownloaderConfig {
    pub binary: String,
    pub format: String,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            format: "best".to_string(),
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub downloader: DownloaderConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads the optional config file, then layers the process environment on top.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = var("S3_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(region) = var("S3_REGION") {
            self.storage.region = Some(region);
        }
        if let Some(endpoint) = var("S3_ENDPOINT_URL") {
            self.storage.endpoint_url = Some(endpoint);
        }
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(binary) = var("YTDLP_BINARY") {
            self.downloader.binary = binary;
        }
        if let Some(format) = var("YTDLP_FORMAT") {
            self.downloader.format = format;
        }
        if let Some(dir) = var("SCRATCH_DIR") {
            self.downloader.scratch_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cors.allowed_origins.is_empty() {
            bail!("At least one allowed origin must be configured");
        }
        if self.downloader.binary.trim().is_empty() {
            bail!("Downloader binary must not be empty");
        }
        Ok(())
    }

    pub fn bucket(&self) -> Option<&str> {
        self.storage
            .bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
    }

    pub fn get_logging_format(&self) -> &str {
        &self.logging.format
    }
}
