//! Object storage integration tests
//!
//! **Requirements**:
//! - MinIO (or another S3-compatible store) must be running
//! - S3_ENDPOINT environment variable must be set
//! - The configured bucket (S3_BUCKET, default `srcdata`) must exist
//!
//! **Running tests**:
//! ```bash
//! S3_ENDPOINT=http://localhost:9000 cargo test --test storage_tests
//! ```

use etl_loader::error::IngestError;
use etl_loader::ingest::lister::{MonthRange, ObjectLister, ObjectSource};
use etl_loader::storage::{config::StorageConfig, Storage};
use serial_test::serial;
use tempfile::TempDir;

fn setup_storage() -> Option<Storage> {
    if std::env::var("S3_ENDPOINT").is_err() {
        eprintln!("Skipping test: S3_ENDPOINT not configured");
        return None;
    }
    Some(Storage::new(StorageConfig::from_env()))
}

#[tokio::test]
#[serial]
async fn test_missing_bucket_is_connectivity_error() {
    let Some(storage) = setup_storage() else { return };

    let err = storage
        .probe("etl-loader-bucket-that-does-not-exist")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Connectivity(_)));
}

#[tokio::test]
#[serial]
async fn test_listing_respects_month_range() {
    let Some(storage) = setup_storage() else { return };
    let bucket = storage.bucket().to_string();

    let range = MonthRange::new(Some("202101"), "202112").unwrap();
    let objects = ObjectLister::new(&storage)
        .list(&bucket, "products,prices,contracts", &range)
        .await
        .unwrap();

    for object in &objects {
        assert!(range.contains(&object.month), "{} out of range", object.key);
        assert!(object.key.ends_with(&format!("_{}.csv", object.entity)));
    }
}

#[tokio::test]
#[serial]
async fn test_download_first_listed_object() {
    let Some(storage) = setup_storage() else { return };
    let bucket = storage.bucket().to_string();

    let keys = storage.list_keys(&bucket).await.unwrap();
    let Some(key) = keys.first() else {
        eprintln!("Skipping test: bucket {} is empty", bucket);
        return;
    };

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nested").join("object.bin");
    storage.download_to(&bucket, key, &dest).await.unwrap();
    assert!(dest.exists());
}
