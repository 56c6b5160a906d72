//! Trigger API tests

mod common;

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{Method, StatusCode},
    Router,
};
use common::{MemoryObjectSource, MemoryWarehouse, PRICES_CSV, PRODUCTS_CSV};
use etl_loader::api::{create_router, AppState};
use etl_loader::ingest::mapping::InMemoryMappingRepository;
use etl_loader::ingest::pipeline::IngestPipeline;
use etl_loader::ingest::reconcile::SchemaReconciler;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn app(source: MemoryObjectSource, warehouse: MemoryWarehouse, work_dir: &TempDir) -> Router {
    let pipeline = IngestPipeline::new(
        Arc::new(source),
        Arc::new(warehouse),
        SchemaReconciler::new(Arc::new(InMemoryMappingRepository::new())),
        "srcdata",
        work_dir.path(),
    );
    create_router(AppState {
        pipeline: Arc::new(pipeline),
    })
}

fn exports() -> MemoryObjectSource {
    MemoryObjectSource::new()
        .with_object("20210100000001_products.csv", PRODUCTS_CSV)
        .with_object("20210100000002_prices.csv", PRICES_CSV)
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_reports_bucket() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        app(exports(), MemoryWarehouse::new(), &dir),
        Method::GET,
        "/health",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["bucket"], "srcdata");
}

#[tokio::test]
async fn test_health_unavailable_when_database_down() {
    let dir = TempDir::new().unwrap();
    let warehouse = MemoryWarehouse {
        unhealthy: true,
        ..Default::default()
    };
    let (status, body) = send(app(exports(), warehouse, &dir), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_run_returns_report() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        app(exports(), MemoryWarehouse::new(), &dir),
        Method::POST,
        "/run",
        Some(serde_json::json!({
            "entity": "products,prices",
            "start_month": "202101",
            "end_month": "202101",
            "load_id": "20240102_030405678"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["report"]["load_id"], "20240102_030405678");
    assert_eq!(body["report"]["loaded"].as_array().unwrap().len(), 2);
    assert_eq!(body["report"]["loaded"][0]["status"], "SUCCESS");
}

#[tokio::test]
async fn test_run_rejects_invalid_month() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        app(exports(), MemoryWarehouse::new(), &dir),
        Method::POST,
        "/run",
        Some(serde_json::json!({"entity": "prices", "end_month": "2021-01", "load_id": "L1"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("2021-01"));
}

#[tokio::test]
async fn test_consolidate_without_tables_is_empty() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        app(exports(), MemoryWarehouse::new(), &dir),
        Method::POST,
        "/consolidate/L9",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["views"], serde_json::json!([]));
}
