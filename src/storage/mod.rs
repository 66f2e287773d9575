pub mod key;
mod s3;

pub use s3::S3Store;

use crate::utils::StepOutcome;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` to `bucket` under `key`, replacing any existing object
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
}

/// Uploads downloaded media into the configured bucket.
pub struct Publisher {
    store: Box<dyn ObjectStore>,
    bucket: Option<String>,
}

impl Publisher {
    pub fn new(store: Box<dyn ObjectStore>, bucket: Option<String>) -> Self {
        if bucket.is_none() {
            warn!("No S3 bucket configured, every upload will fail until S3_BUCKET is set");
        }
        Self { store, bucket }
    }

    /// Configured bucket name, empty when unset.
    pub fn bucket(&self) -> &str {
        self.bucket.as_deref().unwrap_or_default()
    }

    pub async fn publish(&self, local_path: &Path, key: &str) -> StepOutcome {
        let Some(bucket) = self.bucket.as_deref() else {
            warn!("Error uploading to S3: no bucket configured");
            return StepOutcome::failed("S3 bucket is not configured");
        };

        match self.store.put_file(bucket, key, local_path).await {
            Ok(()) => {
                info!("Uploaded {} to s3://{}/{}", local_path.display(), bucket, key);
                StepOutcome::Completed
            }
            Err(e) => {
                warn!("Error uploading to S3: {:#}", e);
                StepOutcome::failed(format!("{e:#}"))
            }
        }
    }
}
