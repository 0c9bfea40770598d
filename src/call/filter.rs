use crate::call::chunk::AudioChunk;
use crate::call::sink::ChunkSink;
use crate::observer::{CallObserver, NoopObserver};
use std::sync::Arc;

/// Drops chunks that carry nothing worth forwarding.
///
/// A chunk passes if it has samples, or if it is the empty closing chunk of a
/// call whose earlier chunks were already forwarded (downstream needs it to
/// finalize). Anything else is dropped and its checkpoints are released on
/// the spot, since no upload will ever cover them.
pub struct SanityFilter {
    next: Box<dyn ChunkSink>,
    observer: Arc<dyn CallObserver>,
}

impl SanityFilter {
    pub fn new(next: Box<dyn ChunkSink>) -> Self {
        Self {
            next,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn should_forward(chunk: &AudioChunk) -> bool {
        !chunk.is_empty() || (chunk.is_last && !chunk.is_first)
    }
}

impl ChunkSink for SanityFilter {
    fn consume(&mut self, chunk: AudioChunk) {
        if Self::should_forward(&chunk) {
            self.next.consume(chunk);
            return;
        }

        tracing::trace!(
            channel = %chunk.channel_id,
            checkpoints = chunk.checkpoints.len(),
            "dropping empty chunk"
        );
        chunk.checkpoint();
        self.observer.chunk_dropped();
    }

    fn name(&self) -> &'static str {
        "sanity-filter"
    }
}
