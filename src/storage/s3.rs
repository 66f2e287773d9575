use super::ObjectStore;
use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info};

/// Object store backed by S3 (or an S3-compatible endpoint).
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn from_config(config: &StorageConfig) -> Self {
        let region_provider = match &config.region {
            Some(region) => {
                RegionProviderChain::first_try(aws_config::Region::new(region.clone()))
            }
            None => RegionProviderChain::default_provider(),
        };

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let client = match &config.endpoint_url {
            Some(endpoint) => {
                info!("Using custom S3 endpoint: {}", endpoint);
                // MinIO and friends need path-style addressing
                let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&sdk_config),
        };

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        debug!("Uploading {} to s3://{}/{}", path.display(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 PutObject failed: {}", DisplayErrorContext(&e)))?;

        Ok(())
    }
}
