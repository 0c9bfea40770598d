//! Blob storage for finished call artifacts.
//!
//! Uploads are fire-and-forget from the caller's point of view: [`BlobStore::upload`]
//! returns immediately and the outcome is delivered to a completion callback,
//! possibly on another thread. The production store runs uploads on the tokio
//! runtime through `object_store`, so the same code talks to S3, a local
//! directory, or memory.

use crate::config::{StorageBackend, StorageConfig};
use crate::defaults::{MULTIPART_PART_BYTES, MULTIPART_THRESHOLD_BYTES};
use crate::error::Result;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMultipartOptions, PutOptions,
    PutPayload,
};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

/// Terminal state of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed,
    Failed(String),
    /// The upload was abandoned before it finished (e.g. shutdown drain timed out).
    Canceled,
    /// One part of a multipart upload failed; the upload was aborted.
    PartFailed(String),
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed)
    }
}

/// Descriptive metadata stored alongside each artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadMetadata {
    pub channel_id: String,
    pub terminated: bool,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// Artifact size in bytes.
    pub content_length: usize,
}

impl UploadMetadata {
    /// User-metadata pairs as written to the store. Unknown time bounds are omitted.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("channel_id", self.channel_id.clone()),
            ("terminated", self.terminated.to_string()),
        ];
        if let Some(start) = self.start_time {
            pairs.push(("start_time", start.to_string()));
        }
        if let Some(end) = self.end_time {
            pairs.push(("end_time", end.to_string()));
        }
        pairs.push(("latitude", self.latitude.to_string()));
        pairs.push(("longitude", self.longitude.to_string()));
        pairs
    }

    fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from("audio/wav"),
        );
        for (key, value) in self.to_pairs() {
            attributes.insert(Attribute::Metadata(Cow::Borrowed(key)), AttributeValue::from(value));
        }
        attributes
    }
}

/// Completion callback for one upload. Invoked exactly once.
pub type UploadCallback = Box<dyn FnOnce(UploadOutcome) + Send + 'static>;

/// Trait for artifact stores.
///
/// This trait allows swapping implementations (object store vs mock).
pub trait BlobStore: Send + Sync {
    /// Start uploading `bytes` under `key`. Never blocks on the transfer.
    fn upload(&self, key: String, bytes: Vec<u8>, metadata: UploadMetadata, on_complete: UploadCallback);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "blob-store"
    }
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn upload(&self, key: String, bytes: Vec<u8>, metadata: UploadMetadata, on_complete: UploadCallback) {
        (**self).upload(key, bytes, metadata, on_complete)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Fires the callback with [`UploadOutcome::Canceled`] if the task is dropped early.
struct Completion(Option<UploadCallback>);

impl Completion {
    fn fire(mut self, outcome: UploadOutcome) {
        if let Some(callback) = self.0.take() {
            callback(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.0.take() {
            callback(UploadOutcome::Canceled);
        }
    }
}

/// How artifact metadata is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// As object attributes (S3 user metadata, in-memory attributes).
    Attributes,
    /// As a `<key>.json` object next to the artifact, for stores without attributes.
    Sidecar,
}

/// [`BlobStore`] backed by any `object_store` implementation.
pub struct ObjectStoreBlobStore {
    store: Arc<dyn ObjectStore>,
    runtime: Handle,
    metadata_mode: MetadataMode,
    tasks: Mutex<JoinSet<()>>,
}

impl ObjectStoreBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, runtime: Handle) -> Self {
        Self {
            store,
            runtime,
            metadata_mode: MetadataMode::Attributes,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_metadata_mode(mut self, mode: MetadataMode) -> Self {
        self.metadata_mode = mode;
        self
    }

    /// Build the backend selected by `config`.
    pub fn from_config(config: &StorageConfig, runtime: Handle) -> Result<Self> {
        let (store, mode): (Arc<dyn ObjectStore>, MetadataMode) = match config.backend {
            StorageBackend::Memory => (
                Arc::new(object_store::memory::InMemory::new()),
                MetadataMode::Attributes,
            ),
            StorageBackend::Local => {
                std::fs::create_dir_all(&config.local_root)?;
                let local = object_store::local::LocalFileSystem::new_with_prefix(&config.local_root)?
                    .with_automatic_cleanup(true);
                (Arc::new(local), MetadataMode::Sidecar)
            }
            StorageBackend::S3 => (build_s3(config)?, MetadataMode::Attributes),
        };

        tracing::info!(
            backend = ?config.backend,
            bucket = %config.bucket,
            prefix = %config.key_prefix,
            "blob store ready"
        );
        Ok(Self::new(store, runtime).with_metadata_mode(mode))
    }

    /// The underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Uploads started but not yet finished.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait for every in-flight upload to finish.
    ///
    /// Dropping the returned future early aborts the remaining uploads, whose
    /// callbacks then observe [`UploadOutcome::Canceled`].
    pub async fn drain(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result
                && e.is_panic()
            {
                tracing::error!(error = %e, "upload task panicked");
            }
        }
    }
}

#[cfg(feature = "s3")]
fn build_s3(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store = object_store::aws::AmazonS3Builder::from_env()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .build()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "s3"))]
fn build_s3(_config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    Err(crate::error::CallError::ConfigInvalidValue {
        key: "storage.backend".to_string(),
        message: "built without the s3 feature".to_string(),
    })
}

impl BlobStore for ObjectStoreBlobStore {
    fn upload(&self, key: String, bytes: Vec<u8>, metadata: UploadMetadata, on_complete: UploadCallback) {
        let completion = Completion(Some(on_complete));
        let store = Arc::clone(&self.store);
        let mode = self.metadata_mode;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                let outcome = put_artifact(store.as_ref(), &key, bytes, &metadata, mode).await;
                match &outcome {
                    UploadOutcome::Completed => {
                        tracing::debug!(%key, bytes = metadata.content_length, "upload completed")
                    }
                    other => tracing::warn!(%key, outcome = ?other, "upload did not complete"),
                }
                completion.fire(outcome);
            },
            &self.runtime,
        );
    }

    fn name(&self) -> &'static str {
        "object-store"
    }
}

async fn put_artifact(
    store: &dyn ObjectStore,
    key: &str,
    bytes: Vec<u8>,
    metadata: &UploadMetadata,
    mode: MetadataMode,
) -> UploadOutcome {
    let path = match ObjectPath::parse(key) {
        Ok(path) => path,
        Err(e) => return UploadOutcome::Failed(format!("invalid object key {key}: {e}")),
    };
    let attributes = match mode {
        MetadataMode::Attributes => metadata.to_attributes(),
        MetadataMode::Sidecar => Attributes::new(),
    };

    let outcome = if bytes.len() >= MULTIPART_THRESHOLD_BYTES {
        put_multipart(store, &path, bytes, attributes).await
    } else {
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        match store.put_opts(&path, PutPayload::from(bytes), opts).await {
            Ok(_) => UploadOutcome::Completed,
            Err(e) => UploadOutcome::Failed(e.to_string()),
        }
    };

    if outcome.is_completed() && mode == MetadataMode::Sidecar {
        return put_sidecar(store, key, metadata).await;
    }
    outcome
}

async fn put_multipart(
    store: &dyn ObjectStore,
    path: &ObjectPath,
    bytes: Vec<u8>,
    attributes: Attributes,
) -> UploadOutcome {
    let opts = PutMultipartOptions {
        attributes,
        ..Default::default()
    };
    let mut upload = match store.put_multipart_opts(path, opts).await {
        Ok(upload) => upload,
        Err(e) => return UploadOutcome::Failed(e.to_string()),
    };

    for part in bytes.chunks(MULTIPART_PART_BYTES) {
        if let Err(e) = upload.put_part(PutPayload::from(part.to_vec())).await {
            if let Err(abort) = upload.abort().await {
                tracing::warn!(%path, error = %abort, "failed to abort multipart upload");
            }
            return UploadOutcome::PartFailed(e.to_string());
        }
    }

    match upload.complete().await {
        Ok(_) => UploadOutcome::Completed,
        Err(e) => UploadOutcome::Failed(e.to_string()),
    }
}

async fn put_sidecar(store: &dyn ObjectStore, key: &str, metadata: &UploadMetadata) -> UploadOutcome {
    let sidecar = format!("{key}.json");
    let path = match ObjectPath::parse(&sidecar) {
        Ok(path) => path,
        Err(e) => return UploadOutcome::Failed(format!("invalid object key {sidecar}: {e}")),
    };
    let body = match serde_json::to_vec(metadata) {
        Ok(body) => body,
        Err(e) => return UploadOutcome::Failed(e.to_string()),
    };
    match store.put(&path, PutPayload::from(body)).await {
        Ok(_) => UploadOutcome::Completed,
        Err(e) => UploadOutcome::Failed(e.to_string()),
    }
}

/// An upload captured by [`MockBlobStore`].
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub key: String,
    pub bytes: Vec<u8>,
    pub metadata: UploadMetadata,
}

/// Mock blob store for testing
///
/// Records every upload and holds its callback until the test decides the
/// outcome, unless configured to complete immediately.
#[derive(Default)]
pub struct MockBlobStore {
    uploads: Mutex<Vec<RecordedUpload>>,
    pending: Mutex<Vec<UploadCallback>>,
    auto_outcome: Option<UploadOutcome>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to resolve every upload with `outcome` on the spot.
    pub fn with_outcome(mut self, outcome: UploadOutcome) -> Self {
        self.auto_outcome = Some(outcome);
        self
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Uploads whose callback has not fired yet.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolve every pending upload with `outcome`. Returns how many were resolved.
    pub fn resolve_all(&self, outcome: UploadOutcome) -> usize {
        let callbacks =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        let count = callbacks.len();
        for callback in callbacks {
            callback(outcome.clone());
        }
        count
    }

    pub fn complete_all(&self) -> usize {
        self.resolve_all(UploadOutcome::Completed)
    }
}

impl BlobStore for MockBlobStore {
    fn upload(&self, key: String, bytes: Vec<u8>, metadata: UploadMetadata, on_complete: UploadCallback) {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedUpload {
                key,
                bytes,
                metadata,
            });
        match &self.auto_outcome {
            Some(outcome) => on_complete(outcome.clone()),
            None => self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(on_complete),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
