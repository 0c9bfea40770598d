use crate::call::chunk::AudioChunk;
use std::sync::{Arc, Mutex, PoisonError};

/// Downstream consumer of audio chunks.
///
/// Stages chain through this trait: slicer → filter → aggregator.
pub trait ChunkSink: Send + 'static {
    /// Handle one emitted chunk. Called in emission order.
    fn consume(&mut self, chunk: AudioChunk);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Collector sink - keeps every chunk it receives (for testing/inspection).
///
/// Clones share the same storage, so one clone can be handed to a pipeline
/// and the other kept for assertions.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    chunks: Arc<Mutex<Vec<AudioChunk>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All chunks received so far.
    pub fn chunks(&self) -> Vec<AudioChunk> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recently received chunk.
    pub fn last(&self) -> Option<AudioChunk> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkSink for CollectorSink {
    fn consume(&mut self, chunk: AudioChunk) {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk);
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
