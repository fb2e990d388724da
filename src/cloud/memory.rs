//! In-memory [`BlobStore`] for tests and local runs.
//!
//! Thread-safe via std locks; not suitable for production. Failures can be
//! injected per operation through [`Faults`] to exercise the pipeline's
//! error paths without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use crate::cloud::store::{BlobStore, UploadedPart};
use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::models::{ByteStream, DestinationObjectRef, SourceObjectRef};

/// Failures to inject into [`MemoryStore`] operations.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Deny every read with this kind.
    pub read: Option<ErrorKind>,
    /// Fail a read after this many bytes have been delivered.
    pub read_after: Option<(usize, ErrorKind)>,
    pub put: Option<ErrorKind>,
    pub create_upload: Option<ErrorKind>,
    pub upload_part: Option<ErrorKind>,
    pub complete_upload: Option<ErrorKind>,
    /// Delay applied to every part upload, to simulate a slow store.
    pub part_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

#[derive(Debug)]
struct PendingUpload {
    destination: DestinationObjectRef,
    parts: BTreeMap<i64, Bytes>,
}

/// Counters describing what the store was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub puts: u64,
    pub multipart_created: u64,
    pub parts_uploaded: u64,
    pub multipart_completed: u64,
    pub multipart_aborted: u64,
}

pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    faults: RwLock<Faults>,
    stats: Mutex<StoreStats>,
    next_upload_id: AtomicU64,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

fn lock_poisoned() -> PipelineError {
    PipelineError::transport("memory store lock poisoned")
}

fn injected(kind: ErrorKind, operation: &str) -> PipelineError {
    PipelineError::new(kind, format!("injected failure in {}", operation))
}

fn e_tag(data: &[u8]) -> String {
    format!("\"{:08x}\"", crc32fast::hash(data))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that serves reads in chunks of `chunk_size` bytes.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            uploads: Mutex::new(HashMap::new()),
            faults: RwLock::new(Faults::default()),
            stats: Mutex::new(StoreStats::default()),
            next_upload_id: AtomicU64::new(1),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn insert(&self, location: &str, key: &str, data: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                (location.to_string(), key.to_string()),
                StoredObject {
                    data: data.into(),
                    content_type: None,
                },
            );
        }
    }

    pub fn object(&self, location: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .ok()?
            .get(&(location.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    pub fn content_type(&self, location: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(&(location.to_string(), key.to_string()))
            .and_then(|o| o.content_type.clone())
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut current) = self.faults.write() {
            *current = faults;
        }
    }

    /// Multipart uploads that were neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().map(|u| u.len()).unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn faults(&self) -> Result<Faults> {
        self.faults.read().map(|f| f.clone()).map_err(|_| lock_poisoned())
    }

    fn record(&self, update: impl FnOnce(&mut StoreStats)) -> Result<()> {
        let mut stats = self.stats.lock().map_err(|_| lock_poisoned())?;
        update(&mut stats);
        Ok(())
    }

    fn store_object(&self, destination: &DestinationObjectRef, data: Bytes) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| lock_poisoned())?;
        objects.insert(
            (destination.location.clone(), destination.key.clone()),
            StoredObject {
                data,
                content_type: Some(destination.content_type.clone()),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get_object(&self, source: &SourceObjectRef) -> Result<ByteStream> {
        let faults = self.faults()?;
        if let Some(kind) = faults.read {
            return Err(injected(kind, "get_object"));
        }

        let data = self
            .objects
            .read()
            .map_err(|_| lock_poisoned())?
            .get(&(source.location.clone(), source.key.clone()))
            .map(|o| o.data.clone())
            .ok_or_else(|| PipelineError::not_found(format!("{} does not exist", source)))?;

        let (data, trailing_error) = match faults.read_after {
            Some((limit, kind)) if limit < data.len() => {
                (data.slice(..limit), Some(injected(kind, "get_object body")))
            }
            _ => (data, None),
        };

        let mut chunks: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.chunk_size).min(data.len());
            chunks.push(Ok(data.slice(offset..end)));
            offset = end;
        }
        if let Some(err) = trailing_error {
            chunks.push(Err(err));
        }

        Ok(stream::iter(chunks).boxed())
    }

    async fn put_object(
        &self,
        destination: &DestinationObjectRef,
        body: Bytes,
    ) -> Result<Option<String>> {
        if let Some(kind) = self.faults()?.put {
            return Err(injected(kind, "put_object"));
        }
        let tag = e_tag(&body);
        self.store_object(destination, body)?;
        self.record(|s| s.puts += 1)?;
        Ok(Some(tag))
    }

    async fn create_multipart_upload(&self, destination: &DestinationObjectRef) -> Result<String> {
        if let Some(kind) = self.faults()?.create_upload {
            return Err(injected(kind, "create_multipart_upload"));
        }
        let upload_id = format!("upload-{}", self.next_upload_id.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().map_err(|_| lock_poisoned())?.insert(
            upload_id.clone(),
            PendingUpload {
                destination: destination.clone(),
                parts: BTreeMap::new(),
            },
        );
        self.record(|s| s.multipart_created += 1)?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _destination: &DestinationObjectRef,
        upload_id: &str,
        part_number: i64,
        body: Bytes,
    ) -> Result<UploadedPart> {
        let faults = self.faults()?;
        if let Some(delay) = faults.part_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(kind) = faults.upload_part {
            return Err(injected(kind, "upload_part"));
        }

        let tag = e_tag(&body);
        {
            let mut uploads = self.uploads.lock().map_err(|_| lock_poisoned())?;
            let upload = uploads
                .get_mut(upload_id)
                .ok_or_else(|| PipelineError::not_found(format!("no such upload {}", upload_id)))?;
            upload.parts.insert(part_number, body);
        }
        self.record(|s| s.parts_uploaded += 1)?;

        Ok(UploadedPart {
            part_number,
            e_tag: tag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        _destination: &DestinationObjectRef,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<Option<String>> {
        if let Some(kind) = self.faults()?.complete_upload {
            return Err(injected(kind, "complete_multipart_upload"));
        }

        let upload = self
            .uploads
            .lock()
            .map_err(|_| lock_poisoned())?
            .remove(upload_id)
            .ok_or_else(|| PipelineError::not_found(format!("no such upload {}", upload_id)))?;

        if parts.len() != upload.parts.len() {
            return Err(PipelineError::transport(format!(
                "upload {} lists {} parts but {} were uploaded",
                upload_id,
                parts.len(),
                upload.parts.len()
            )));
        }

        let mut data = BytesMut::new();
        for part in upload.parts.values() {
            data.extend_from_slice(part);
        }
        let data = data.freeze();
        let tag = e_tag(&data);

        self.store_object(&upload.destination, data)?;
        self.record(|s| s.multipart_completed += 1)?;
        Ok(Some(tag))
    }

    async fn abort_multipart_upload(
        &self,
        _destination: &DestinationObjectRef,
        upload_id: &str,
    ) -> Result<()> {
        self.uploads
            .lock()
            .map_err(|_| lock_poisoned())?
            .remove(upload_id);
        self.record(|s| s.multipart_aborted += 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_read_in_chunks() {
        let store = MemoryStore::with_chunk_size(4);
        store.insert("bucket", "a.txt", &b"0123456789"[..]);

        let chunks: Vec<Bytes> = store
            .get_object(&SourceObjectRef::new("bucket", "a.txt"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"0123456789");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_object(&SourceObjectRef::new("bucket", "missing"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_read_fault_after_bytes() {
        let store = MemoryStore::with_chunk_size(4);
        store.insert("bucket", "a.txt", &b"0123456789"[..]);
        store.set_faults(Faults {
            read_after: Some((6, ErrorKind::TransportError)),
            ..Faults::default()
        });

        let items: Vec<Result<Bytes>> = store
            .get_object(&SourceObjectRef::new("bucket", "a.txt"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().as_ref(), b"0123");
        assert_eq!(items[1].as_ref().unwrap().as_ref(), b"45");
        assert_eq!(items[2].as_ref().unwrap_err().kind(), ErrorKind::TransportError);
    }

    #[tokio::test]
    async fn test_multipart_round_trip() {
        let store = MemoryStore::new();
        let destination = DestinationObjectRef::archive("bucket", "zip/a.zip");

        let upload_id = store.create_multipart_upload(&destination).await.unwrap();
        let second = store
            .upload_part(&destination, &upload_id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let first = store
            .upload_part(&destination, &upload_id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        store
            .complete_multipart_upload(&destination, &upload_id, vec![second, first])
            .await
            .unwrap();

        assert_eq!(store.object("bucket", "zip/a.zip").unwrap().as_ref(), b"hello world");
        assert_eq!(store.content_type("bucket", "zip/a.zip").as_deref(), Some("application/zip"));
        assert_eq!(store.pending_uploads(), 0);
    }
}
