//! Assembly and upload of one call's artifact.

use crate::call::chunk::AudioChunk;
use crate::checkpoint::Checkpoint;
use crate::clock::Clock;
use crate::defaults::UNIT_ID_NONE;
use crate::error::Result;
use crate::observer::CallObserver;
use crate::protocol::ChannelId;
use crate::storage::{BlobStore, UploadMetadata, UploadOutcome};
use crate::wav::writer::encode_wav;
use std::sync::Arc;

/// Everything the sender needs from its surroundings to finalize a call.
#[derive(Clone)]
pub struct UploadContext {
    pub store: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub observer: Arc<dyn CallObserver>,
    pub key_prefix: String,
}

/// Accumulates the chunks of one call until its last chunk arrives.
#[derive(Debug)]
pub struct CallSender {
    chunks: Vec<AudioChunk>,
}

impl CallSender {
    pub fn new(first: AudioChunk) -> Self {
        Self {
            chunks: vec![first],
        }
    }

    pub fn queue(&mut self, chunk: AudioChunk) {
        self.chunks.push(chunk);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Channel of the call with the first known source unit substituted in.
    pub fn resolved_channel_id(&self) -> ChannelId {
        let original = self.chunks[0].channel_id;
        self.chunks
            .iter()
            .map(|chunk| chunk.source_id)
            .find(|&source| source != UNIT_ID_NONE)
            .map_or(original, |source| original.with_source_id(source))
    }

    pub fn metadata(&self, content_length: usize) -> UploadMetadata {
        let (latitude, longitude) = self
            .chunks
            .iter()
            .map(|chunk| (chunk.latitude, chunk.longitude))
            .find(|&(lat, lon)| lat != 0.0 || lon != 0.0)
            .unwrap_or((0.0, 0.0));

        UploadMetadata {
            channel_id: self.resolved_channel_id().to_string(),
            terminated: self.chunks.iter().any(|chunk| chunk.terminated),
            start_time: self.chunks.iter().filter_map(|chunk| chunk.start_time).min(),
            end_time: self.chunks.iter().filter_map(|chunk| chunk.end_time).max(),
            latitude,
            longitude,
            content_length,
        }
    }

    /// `{prefix}{channel}:{now_millis}.wav`
    pub fn object_key(&self, prefix: &str, now_millis: i64) -> String {
        format!("{}{}:{}.wav", prefix, self.resolved_channel_id(), now_millis)
    }

    fn checkpoints(&self) -> Vec<Checkpoint> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.checkpoints.iter().cloned())
            .collect()
    }

    /// Encode the call and hand it to the store.
    ///
    /// A call without audio releases its checkpoints right away. Otherwise the
    /// checkpoints are released only once the store confirms the upload.
    pub fn finalize(self, ctx: &UploadContext) -> Result<()> {
        let checkpoints = self.checkpoints();
        let Some(bytes) = encode_wav(self.chunks.iter().map(|chunk| chunk.samples.as_slice()))?
        else {
            tracing::debug!(
                channel = %self.resolved_channel_id(),
                checkpoints = checkpoints.len(),
                "call has no audio, releasing checkpoints"
            );
            crate::checkpoint::release_all(&checkpoints);
            return Ok(());
        };

        let metadata = self.metadata(bytes.len());
        let key = self.object_key(&ctx.key_prefix, ctx.clock.now_millis());
        tracing::info!(
            %key,
            bytes = bytes.len(),
            chunks = self.chunks.len(),
            terminated = metadata.terminated,
            "uploading call"
        );
        ctx.observer.artifact_queued(bytes.len());

        let observer = Arc::clone(&ctx.observer);
        let upload_key = key.clone();
        ctx.store.upload(
            key,
            bytes,
            metadata,
            Box::new(move |outcome| match outcome {
                UploadOutcome::Completed => {
                    crate::checkpoint::release_all(&checkpoints);
                    observer.upload_succeeded();
                }
                other => {
                    tracing::error!(
                        key = %upload_key,
                        outcome = ?other,
                        withheld = checkpoints.len(),
                        "call upload failed, checkpoints withheld"
                    );
                    observer.upload_failed();
                }
            }),
        );
        Ok(())
    }
}
