//! Invocation surface: trigger parsing, key conventions and the result envelope.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::constants::{
    CORS_ALLOW_ORIGIN_HEADER, HTTP_STATUS_INTERNAL_ERROR, HTTP_STATUS_OK,
};
use crate::models::{DestinationObjectRef, PipelineOutcome, SourceObjectRef};
use crate::pipeline::{ArchiveFormat, PipelineCoordinator};

/// Object-created notification delivered by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<TriggerRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRecord {
    pub s3: TriggerEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEntity {
    pub bucket: TriggerBucket,
    pub object: TriggerObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerBucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerObject {
    pub key: String,
}

impl TriggerEvent {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse trigger event")
    }

    /// The object named by the first record, with its key URL-decoded.
    pub fn source(&self) -> Result<SourceObjectRef> {
        let record = self
            .records
            .first()
            .ok_or_else(|| anyhow!("Trigger event contains no records"))?;
        let key = decode_object_key(&record.s3.object.key)?;
        Ok(SourceObjectRef::new(record.s3.bucket.name.clone(), key))
    }
}

/// Decodes an object key as it appears in notifications (`+` for spaces, `%XX` escapes).
pub fn decode_object_key(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|pair| std::str::from_utf8(pair).ok())
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok());
                match hex {
                    Some(byte) => decoded.push(byte),
                    None => bail!("Invalid escape sequence in object key: {}", raw),
                }
                i += 3;
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8(decoded).context(format!("Object key is not valid UTF-8: {}", raw))
}

/// Last non-empty path segment of an object key.
///
/// Folder placeholder keys such as `reports/2024/` name their last segment;
/// keys made only of separators have no file name and are rejected.
pub fn object_file_name(key: &str) -> Result<&str> {
    Path::new(key)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Object key has no file name: {:?}", key))
}

/// `<prefix>/<stem>.zip`, where the stem is the key's file name without its last extension.
pub fn destination_key(prefix: &str, key: &str) -> Result<String> {
    let file_name = object_file_name(key)?;
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    let extension = ArchiveFormat::Zip.extension();

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        Ok(format!("{}.{}", stem, extension))
    } else {
        Ok(format!("{}/{}.{}", prefix, stem, extension))
    }
}

/// Name of the archive member: `<folder>/<file name of key>`.
pub fn archive_entry_name(folder: &str, key: &str) -> Result<String> {
    Ok(join_entry_name(folder, object_file_name(key)?))
}

fn join_entry_name(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), file_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub message: String,
    pub request_id: String,
}

/// Caller-facing result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded [`ResponseBody`].
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl ResultEnvelope {
    pub fn from_outcome(outcome: &PipelineOutcome, request_id: &str) -> Self {
        let status_code = if outcome.is_success() {
            HTTP_STATUS_OK
        } else {
            HTTP_STATUS_INTERNAL_ERROR
        };
        let body = ResponseBody {
            message: outcome.message(),
            request_id: request_id.to_string(),
        };

        let mut headers = BTreeMap::new();
        headers.insert(CORS_ALLOW_ORIGIN_HEADER.to_string(), "*".to_string());

        Self {
            status_code,
            // A struct of two strings always serializes.
            body: serde_json::to_string(&body).unwrap_or_default(),
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == HTTP_STATUS_OK
    }

    pub fn response_body(&self) -> Result<ResponseBody> {
        serde_json::from_str(&self.body).context("Envelope body is not a response body")
    }
}

/// One archive-and-republish invocation for a single object.
pub struct ZipHandler {
    coordinator: PipelineCoordinator,
    source: SourceObjectRef,
    request_id: String,
    archive_file_path: String,
    archive_folder_path: String,
    file_name: String,
}

impl ZipHandler {
    /// The archive is written to the source bucket under `archive_file_path`.
    ///
    /// Fails if the source key has no file name to use for the archive entry.
    pub fn new(
        coordinator: PipelineCoordinator,
        source: SourceObjectRef,
        request_id: impl Into<String>,
        archive_file_path: impl Into<String>,
    ) -> Result<Self> {
        let file_name = object_file_name(&source.key)?.to_string();
        Ok(Self {
            coordinator,
            source,
            request_id: request_id.into(),
            archive_file_path: archive_file_path.into(),
            archive_folder_path: String::new(),
            file_name,
        })
    }

    /// Handler for the object named by a trigger event, republished under `prefix`.
    pub fn from_event(
        coordinator: PipelineCoordinator,
        event: &TriggerEvent,
        request_id: impl Into<String>,
        prefix: &str,
    ) -> Result<Self> {
        let source = event.source()?;
        let archive_file_path = destination_key(prefix, &source.key)?;
        Self::new(coordinator, source, request_id, archive_file_path)
    }

    pub fn with_archive_folder(mut self, folder: impl Into<String>) -> Self {
        self.archive_folder_path = folder.into();
        self
    }

    pub fn source(&self) -> &SourceObjectRef {
        &self.source
    }

    pub fn destination(&self) -> DestinationObjectRef {
        DestinationObjectRef {
            location: self.source.location.clone(),
            key: self.archive_file_path.clone(),
            content_type: self
                .coordinator
                .options()
                .archive
                .format
                .content_type()
                .to_string(),
        }
    }

    pub fn entry_name(&self) -> String {
        join_entry_name(&self.archive_folder_path, &self.file_name)
    }

    pub async fn process(&self) -> ResultEnvelope {
        info!(
            "Request {}: {} -> {}",
            self.request_id,
            self.source,
            self.destination()
        );
        let outcome = self
            .coordinator
            .process(&self.source, &self.entry_name(), self.destination())
            .await;
        ResultEnvelope::from_outcome(&outcome, &self.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    const EVENT: &str = r#"{
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": {"name": "bucket", "arn": "arn:aws:s3:::bucket"},
                "object": {"key": "reports/q1+final%282%29.csv", "size": 1024}
            }
        }]
    }"#;

    #[test]
    fn test_trigger_event_source() {
        let event = TriggerEvent::from_json(EVENT).unwrap();
        let source = event.source().unwrap();
        assert_eq!(source.location, "bucket");
        assert_eq!(source.key, "reports/q1 final(2).csv");
    }

    #[test]
    fn test_trigger_event_without_records() {
        let event = TriggerEvent::from_json(r#"{"Records": []}"#).unwrap();
        assert!(event.source().is_err());
        assert!(TriggerEvent::from_json("not json").is_err());
    }

    #[test]
    fn test_decode_object_key() {
        assert_eq!(decode_object_key("plain/key.csv").unwrap(), "plain/key.csv");
        assert_eq!(decode_object_key("a%2Fb%20c").unwrap(), "a/b c");
        assert_eq!(decode_object_key("caf%C3%A9.txt").unwrap(), "café.txt");
        assert!(decode_object_key("bad%zz").is_err());
        assert!(decode_object_key("short%2").is_err());
        assert!(decode_object_key("%FF").is_err());
    }

    #[test]
    fn test_destination_key() {
        assert_eq!(destination_key("zip", "reports/q1.csv").unwrap(), "zip/q1.zip");
        assert_eq!(
            destination_key("zip/", "archive.tar.gz").unwrap(),
            "zip/archive.tar.zip"
        );
        assert_eq!(destination_key("zip", "README").unwrap(), "zip/README.zip");
        assert_eq!(destination_key("", "a/b/c.txt").unwrap(), "c.zip");
    }

    #[test]
    fn test_archive_entry_name() {
        assert_eq!(archive_entry_name("", "reports/q1.csv").unwrap(), "/q1.csv");
        assert_eq!(archive_entry_name("files", "q1.csv").unwrap(), "files/q1.csv");
        assert_eq!(
            archive_entry_name("zip/files/", "a/b.txt").unwrap(),
            "zip/files/b.txt"
        );
    }

    #[test]
    fn test_folder_key_names_its_last_segment() {
        assert_eq!(object_file_name("a/b/").unwrap(), "b");
        assert_eq!(archive_entry_name("", "a/b/").unwrap(), "/b");
        assert_eq!(destination_key("zip", "reports/2024/").unwrap(), "zip/2024.zip");
        assert_eq!(archive_entry_name("", "reports/2024/").unwrap(), "/2024");
    }

    #[test]
    fn test_separator_only_key_is_rejected() {
        assert!(object_file_name("/").is_err());
        assert!(archive_entry_name("", "/").is_err());
        assert!(destination_key("zip", "/").is_err());
        assert!(destination_key("zip", "").is_err());
    }

    #[test]
    fn test_envelope_for_success() {
        let envelope = ResultEnvelope::from_outcome(&PipelineOutcome::success(), "req-1");
        assert_eq!(envelope.status_code, 200);
        assert!(envelope.is_success());
        assert_eq!(envelope.headers.get("Access-Control-Allow-Origin").unwrap(), "*");

        let body = envelope.response_body().unwrap();
        assert_eq!(body.message, "uploaded");
        assert_eq!(body.request_id, "req-1");
    }

    #[test]
    fn test_envelope_for_failure() {
        let outcome = PipelineOutcome::failure(PipelineError::not_found("s3://bucket/q1.csv"));
        let envelope = ResultEnvelope::from_outcome(&outcome, "req-2");
        assert_eq!(envelope.status_code, 500);

        let body = envelope.response_body().unwrap();
        assert_eq!(body.message, "NotFound: s3://bucket/q1.csv");

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["statusCode"], 500);
        assert_eq!(json["headers"]["Access-Control-Allow-Origin"], "*");
    }
}
