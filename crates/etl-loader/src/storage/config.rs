use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_BUCKET: &str = "srcdata";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl StorageConfig {
    /// Read `S3_*` variables, falling back to the `MINIO_*` names used by the
    /// docker-compose deployment.
    pub fn from_env() -> Self {
        let first = |names: &[&str]| names.iter().find_map(|name| env::var(name).ok());

        let endpoint = first(&["S3_ENDPOINT", "MINIO_ENDPOINT"]);
        Self {
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(endpoint.is_some()),
            endpoint,
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            bucket: first(&["S3_BUCKET", "MINIO_BUCKET"])
                .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            access_key: first(&["S3_ACCESS_KEY", "MINIO_ACCESS_KEY", "AWS_ACCESS_KEY_ID"])
                .unwrap_or_else(|| "minioadmin".to_string()),
            secret_key: first(&["S3_SECRET_KEY", "MINIO_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"])
                .unwrap_or_else(|| "minioadmin".to_string()),
        }
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }
}
