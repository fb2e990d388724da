use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::models::{ByteStream, DestinationObjectRef, SourceObjectRef};

/// A part accepted by the store as part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i64,
    pub e_tag: String,
}

/// Object storage operations used by the pipeline.
///
/// Implemented by [`crate::cloud::s3::S3Store`] for S3 and by
/// [`crate::cloud::memory::MemoryStore`] for tests. Implementations classify
/// their failures into the crate's [`crate::error::ErrorKind`] taxonomy and
/// do not retry; retries belong to the client transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Starts reading an object. The body is streamed; transport errors may
    /// surface after the first chunks have been delivered.
    async fn get_object(&self, source: &SourceObjectRef) -> Result<ByteStream>;

    /// Writes a whole object in one request, returning its entity tag.
    async fn put_object(
        &self,
        destination: &DestinationObjectRef,
        body: Bytes,
    ) -> Result<Option<String>>;

    /// Starts a multipart upload and returns its upload id.
    async fn create_multipart_upload(&self, destination: &DestinationObjectRef) -> Result<String>;

    async fn upload_part(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
        part_number: i64,
        body: Bytes,
    ) -> Result<UploadedPart>;

    /// Commits the parts, in part-number order, as the destination object.
    async fn complete_multipart_upload(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> Result<Option<String>>;

    /// Discards a multipart upload and any parts stored for it.
    async fn abort_multipart_upload(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
    ) -> Result<()>;
}
