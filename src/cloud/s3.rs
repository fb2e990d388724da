use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use log::debug;
use rusoto_core::{ByteStream as BodyStream, RusotoError};
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, GetObjectError, GetObjectRequest,
    PutObjectRequest, S3Client, UploadPartRequest, S3,
};

use crate::cloud::store::{BlobStore, UploadedPart};
use crate::constants::DESTINATION_ACL;
use crate::error::{PipelineError, Result};
use crate::models::{ByteStream, DestinationObjectRef, SourceObjectRef};

/// [`BlobStore`] backed by Amazon S3 (or any S3-compatible service) via rusoto.
#[derive(Clone)]
pub struct S3Store {
    client: Arc<S3Client>,
}

impl S3Store {
    pub fn new(client: Arc<S3Client>) -> Self {
        Self { client }
    }
}

/// Map an HTTP status and error body from the store onto the error taxonomy.
pub fn classify_status(status: u16, body: &str, context: &str) -> PipelineError {
    if status == 507
        || body.contains("QuotaExceeded")
        || body.contains("EntityTooLarge")
        || body.contains("InsufficientStorage")
    {
        return PipelineError::quota_exceeded(format!("{}: HTTP {}", context, status));
    }
    match status {
        404 => PipelineError::not_found(format!("{}: HTTP 404", context)),
        401 | 403 => PipelineError::access_denied(format!("{}: HTTP {}", context, status)),
        _ => PipelineError::transport(format!("{}: HTTP {}", context, status)),
    }
}

/// Map a rusoto error onto the error taxonomy.
pub fn classify<E: std::error::Error + 'static>(
    err: RusotoError<E>,
    context: &str,
) -> PipelineError {
    match err {
        RusotoError::Unknown(response) => {
            classify_status(response.status.as_u16(), response.body_as_str(), context)
        }
        RusotoError::Credentials(e) => PipelineError::access_denied(format!("{}: {}", context, e)),
        RusotoError::HttpDispatch(e) => PipelineError::transport(format!("{}: {}", context, e)),
        other => PipelineError::transport(format!("{}: {}", context, other)),
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get_object(&self, source: &SourceObjectRef) -> Result<ByteStream> {
        let request = GetObjectRequest {
            bucket: source.location.clone(),
            key: source.key.clone(),
            ..Default::default()
        };

        let described = source.to_string();
        let output = self.client.get_object(request).await.map_err(|e| match e {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => {
                PipelineError::not_found(format!("{} does not exist", described))
            }
            other => classify(other, &format!("Failed to read {}", described)),
        })?;

        debug!(
            "Reading {} ({} bytes)",
            described,
            output.content_length.unwrap_or_default()
        );

        let body = output
            .body
            .ok_or_else(|| PipelineError::transport(format!("{} returned no body", described)))?;

        Ok(body
            .map_err(move |e| {
                PipelineError::transport(format!("Failed reading {}: {}", described, e))
            })
            .boxed())
    }

    async fn put_object(
        &self,
        destination: &DestinationObjectRef,
        body: Bytes,
    ) -> Result<Option<String>> {
        let request = PutObjectRequest {
            bucket: destination.location.clone(),
            key: destination.key.clone(),
            acl: Some(DESTINATION_ACL.to_string()),
            content_type: Some(destination.content_type.clone()),
            content_length: Some(body.len() as i64),
            body: Some(BodyStream::from(body.to_vec())),
            ..Default::default()
        };

        let output = self
            .client
            .put_object(request)
            .await
            .map_err(|e| classify(e, &format!("Failed to write {}", destination)))?;

        Ok(output.e_tag)
    }

    async fn create_multipart_upload(&self, destination: &DestinationObjectRef) -> Result<String> {
        let request = CreateMultipartUploadRequest {
            bucket: destination.location.clone(),
            key: destination.key.clone(),
            acl: Some(DESTINATION_ACL.to_string()),
            content_type: Some(destination.content_type.clone()),
            ..Default::default()
        };

        let context = format!("Failed to create multipart upload for {}", destination);
        let output = self
            .client
            .create_multipart_upload(request)
            .await
            .map_err(|e| classify(e, &context))?;

        output
            .upload_id
            .ok_or_else(|| PipelineError::transport("No upload ID returned from S3"))
    }

    async fn upload_part(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
        part_number: i64,
        body: Bytes,
    ) -> Result<UploadedPart> {
        let request = UploadPartRequest {
            bucket: destination.location.clone(),
            key: destination.key.clone(),
            upload_id: upload_id.to_string(),
            part_number,
            content_length: Some(body.len() as i64),
            body: Some(BodyStream::from(body.to_vec())),
            ..Default::default()
        };

        let output = self.client.upload_part(request).await.map_err(|e| {
            classify(e, &format!("Failed to upload part {} of {}", part_number, destination))
        })?;

        let e_tag = output.e_tag.ok_or_else(|| {
            PipelineError::transport(format!("No ETag returned for part {}", part_number))
        })?;

        Ok(UploadedPart { part_number, e_tag })
    }

    async fn complete_multipart_upload(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
        mut parts: Vec<UploadedPart>,
    ) -> Result<Option<String>> {
        parts.sort_by_key(|part| part.part_number);

        let request = CompleteMultipartUploadRequest {
            bucket: destination.location.clone(),
            key: destination.key.clone(),
            upload_id: upload_id.to_string(),
            multipart_upload: Some(CompletedMultipartUpload {
                parts: Some(
                    parts
                        .into_iter()
                        .map(|part| CompletedPart {
                            e_tag: Some(part.e_tag),
                            part_number: Some(part.part_number),
                        })
                        .collect(),
                ),
            }),
            ..Default::default()
        };

        let context = format!("Failed to complete multipart upload for {}", destination);
        let output = self
            .client
            .complete_multipart_upload(request)
            .await
            .map_err(|e| classify(e, &context))?;

        Ok(output.e_tag)
    }

    async fn abort_multipart_upload(
        &self,
        destination: &DestinationObjectRef,
        upload_id: &str,
    ) -> Result<()> {
        let request = AbortMultipartUploadRequest {
            bucket: destination.location.clone(),
            key: destination.key.clone(),
            upload_id: upload_id.to_string(),
            ..Default::default()
        };

        let context = format!("Failed to abort multipart upload for {}", destination);
        self.client
            .abort_multipart_upload(request)
            .await
            .map_err(|e| classify(e, &context))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_classify_status() {
        let kind = |status, body| classify_status(status, body, "op").kind();
        assert_eq!(kind(404, ""), ErrorKind::NotFound);
        assert_eq!(kind(403, "<Code>AccessDenied</Code>"), ErrorKind::AccessDenied);
        assert_eq!(kind(400, "<Code>EntityTooLarge</Code>"), ErrorKind::QuotaExceeded);
        assert_eq!(kind(403, "<Code>QuotaExceeded</Code>"), ErrorKind::QuotaExceeded);
        assert_eq!(kind(503, "<Code>SlowDown</Code>"), ErrorKind::TransportError);
    }

    #[test]
    fn test_classify_keeps_context() {
        let err: RusotoError<GetObjectError> =
            RusotoError::Validation("bucket name is empty".into());
        let classified = classify(err, "Failed to read s3:///key");
        assert_eq!(classified.kind(), ErrorKind::TransportError);
        assert!(classified.message().starts_with("Failed to read s3:///key"));
    }
}
