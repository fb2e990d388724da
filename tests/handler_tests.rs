//! Integration tests for the invocation surface: trigger event in,
//! result envelope out.

use std::io::{Cursor, Read};
use std::sync::Arc;

use anyhow::Result;

use rust_zipper::cloud::{Faults, MemoryStore};
use rust_zipper::config::PipelineConfig;
use rust_zipper::error::ErrorKind;
use rust_zipper::handler::{ResultEnvelope, TriggerEvent, ZipHandler};
use rust_zipper::pipeline::PipelineCoordinator;

fn event(bucket: &str, key: &str) -> TriggerEvent {
    let json = serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "s3": {
                "bucket": {"name": bucket},
                "object": {"key": key, "size": 42}
            }
        }]
    });
    serde_json::from_value(json).unwrap()
}

fn coordinator(store: &Arc<MemoryStore>) -> PipelineCoordinator {
    PipelineCoordinator::new(store.clone(), PipelineConfig::default().stage_options())
}

fn entry_names(archive: &[u8]) -> Result<Vec<String>> {
    let zip = zip::ZipArchive::new(Cursor::new(archive.to_vec()))?;
    Ok(zip.file_names().map(str::to_string).collect())
}

#[tokio::test]
async fn test_event_to_success_envelope() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "reports/q1.csv", &b"id,total\n1,10\n"[..]);

    let handler = ZipHandler::from_event(
        coordinator(&store),
        &event("bucket", "reports/q1.csv"),
        "req-123",
        "zip",
    )?;
    assert_eq!(handler.destination().key, "zip/q1.zip");
    assert_eq!(handler.entry_name(), "/q1.csv");

    let envelope = handler.process().await;
    assert_eq!(envelope.status_code, 200);

    let body = envelope.response_body()?;
    assert_eq!(body.message, "uploaded");
    assert_eq!(body.request_id, "req-123");
    assert_eq!(envelope.headers["Access-Control-Allow-Origin"], "*");

    let archive = store.object("bucket", "zip/q1.zip").expect("archive written");
    assert_eq!(entry_names(&archive)?, vec!["/q1.csv".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_encoded_key_and_archive_folder() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "in box/monthly report.txt", &b"totals"[..]);

    let handler = ZipHandler::from_event(
        coordinator(&store),
        &event("bucket", "in+box/monthly%20report.txt"),
        "req-7",
        "zip",
    )?
    .with_archive_folder("files");

    let envelope = handler.process().await;
    assert!(envelope.is_success(), "{:?}", envelope);

    let archive = store
        .object("bucket", "zip/monthly report.zip")
        .expect("archive written");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive.to_vec()))?;
    let mut entry = zip.by_name("files/monthly report.txt")?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    assert_eq!(content, "totals");
    Ok(())
}

#[tokio::test]
async fn test_missing_object_error_envelope() -> Result<()> {
    let store = Arc::new(MemoryStore::new());

    let handler = ZipHandler::from_event(
        coordinator(&store),
        &event("bucket", "reports/missing.csv"),
        "req-404",
        "zip",
    )?;
    let envelope = handler.process().await;

    assert_eq!(envelope.status_code, 500);
    let body = envelope.response_body()?;
    assert!(body.message.starts_with(&ErrorKind::NotFound.to_string()));
    assert_eq!(body.request_id, "req-404");
    assert!(store.object("bucket", "zip/missing.zip").is_none());
    Ok(())
}

#[tokio::test]
async fn test_upload_failure_error_envelope() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "data.json", &b"{}"[..]);
    store.set_faults(Faults {
        put: Some(ErrorKind::AccessDenied),
        ..Faults::default()
    });

    let handler =
        ZipHandler::from_event(coordinator(&store), &event("bucket", "data.json"), "req-9", "zip")?;
    let envelope = handler.process().await;

    assert!(!envelope.is_success());
    assert!(envelope.response_body()?.message.contains("AccessDenied"));
    Ok(())
}

#[test]
fn test_envelope_serializes_like_a_gateway_response() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let runtime = tokio::runtime::Runtime::new()?;
    store.insert("bucket", "a.txt", &b"a"[..]);

    let handler =
        ZipHandler::from_event(coordinator(&store), &event("bucket", "a.txt"), "req-1", "zip")?;
    let envelope: ResultEnvelope = runtime.block_on(handler.process());
    let json = serde_json::to_value(&envelope)?;

    assert_eq!(json["statusCode"], 200);
    assert!(json["body"].is_string());
    assert_eq!(json["headers"]["Access-Control-Allow-Origin"], "*");
    Ok(())
}

#[test]
fn test_event_without_records_is_rejected() {
    let event = TriggerEvent::from_json(r#"{"Records": []}"#).unwrap();
    let store = Arc::new(MemoryStore::new());
    assert!(ZipHandler::from_event(coordinator(&store), &event, "req", "zip").is_err());
}

#[tokio::test]
async fn test_folder_placeholder_key_archives_a_file() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert("bucket", "reports/2024/", &b"payload bytes"[..]);

    let handler = ZipHandler::from_event(
        coordinator(&store),
        &event("bucket", "reports/2024/"),
        "req-folder",
        "zip",
    )?;
    assert_eq!(handler.destination().key, "zip/2024.zip");
    assert_eq!(handler.entry_name(), "/2024");
    assert!(handler.process().await.is_success());

    let archive = store.object("bucket", "zip/2024.zip").expect("archive written");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive.to_vec()))?;
    let mut entry = zip.by_index(0)?;
    assert_eq!(entry.name(), "/2024");
    assert!(!entry.is_dir());

    let mut content = Vec::new();
    entry.read_to_end(&mut content)?;
    assert_eq!(content, b"payload bytes");
    Ok(())
}

#[test]
fn test_key_without_file_name_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let result =
        ZipHandler::from_event(coordinator(&store), &event("bucket", "/"), "req", "zip");
    assert!(result.is_err());
}
