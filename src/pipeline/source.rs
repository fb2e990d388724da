use std::sync::Arc;

use futures::{StreamExt, TryFutureExt};
use log::debug;

use crate::cloud::store::BlobStore;
use crate::models::{ByteStream, SourceObjectRef};

/// Opens stored objects as lazy byte streams.
#[derive(Clone)]
pub struct SourceReader {
    store: Arc<dyn BlobStore>,
}

impl SourceReader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Nothing is requested from the store until the first chunk is pulled,
    /// so `NotFound`/`AccessDenied` arrive as the first item of the stream
    /// and transport errors may arrive after any number of chunks.
    pub fn open(&self, source: &SourceObjectRef) -> ByteStream {
        let store = Arc::clone(&self.store);
        let source = source.clone();

        async move {
            debug!("Requesting {}", source);
            store.get_object(&source).await
        }
        .try_flatten_stream()
        .boxed()
    }
}
