//! S3/MinIO object store access for source exports

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    Client,
};
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{IngestError, IngestResult};
use crate::ingest::lister::ObjectSource;

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub fn new(config: config::StorageConfig) -> Self {
        debug!(endpoint = ?config.endpoint, bucket = %config.bucket, "Initializing storage client");

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "etl-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Bucket configured for source exports
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectSource for Storage {
    #[instrument(skip(self))]
    async fn probe(&self, bucket: &str) -> IngestResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                IngestError::connectivity(
                    &format!("Bucket '{}' is not reachable", bucket),
                    DisplayErrorContext(e),
                )
            })?;

        debug!("Bucket {} is reachable", bucket);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_keys(&self, bucket: &str) -> IngestResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                IngestError::connectivity(
                    &format!("Failed to list objects in '{}'", bucket),
                    DisplayErrorContext(e),
                )
            })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects in s3://{}", keys.len(), bucket);
        Ok(keys)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> IngestResult<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                IngestError::connectivity(
                    &format!("Failed to download s3://{}/{}", bucket, key),
                    DisplayErrorContext(e),
                )
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                IngestError::connectivity(
                    &format!("Failed to read body of s3://{}/{}", bucket, key),
                    e,
                )
            })?
            .into_bytes();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &data).await?;

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_from_config() {
        let storage = Storage::new(config::StorageConfig::for_minio(
            "http://localhost:9000",
            "srcdata",
        ));
        assert_eq!(storage.bucket(), "srcdata");
    }
}
