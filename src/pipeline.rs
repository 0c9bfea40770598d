//! Per-channel pipeline assembly: slicer → sanity filter → aggregator.

use crate::call::decoder::{SafeDecoder, VoiceDecoder};
use crate::call::filter::SanityFilter;
use crate::call::slicer::{CallPipeline, CallSlicer};
use crate::clock::{Clock, SystemClock};
use crate::config::CallConfig;
use crate::observer::{CallObserver, NoopObserver};
use crate::protocol::ChannelId;
use crate::storage::BlobStore;
use crate::wav::{CallAggregator, UploadContext};
use std::sync::Arc;

/// Builds the pipeline for a newly seen channel.
pub trait CallPipelineFactory: Send + Sync {
    fn create(&self, channel: ChannelId) -> Arc<dyn CallPipeline>;
}

/// Produces a fresh codec instance per channel. Codecs keep inter-frame state.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn VoiceDecoder> + Send + Sync>;

/// Factory wiring each channel into WAV uploads on a shared blob store.
pub struct WavPipelineFactory {
    config: CallConfig,
    decoder_factory: DecoderFactory,
    store: Arc<dyn BlobStore>,
    key_prefix: String,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn CallObserver>,
}

impl WavPipelineFactory {
    pub fn new(
        config: CallConfig,
        decoder_factory: DecoderFactory,
        store: Arc<dyn BlobStore>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            config,
            decoder_factory,
            store,
            key_prefix: key_prefix.into(),
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl CallPipelineFactory for WavPipelineFactory {
    fn create(&self, channel: ChannelId) -> Arc<dyn CallPipeline> {
        let aggregator = CallAggregator::new(UploadContext {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            observer: Arc::clone(&self.observer),
            key_prefix: self.key_prefix.clone(),
        });
        let filter =
            SanityFilter::new(Box::new(aggregator)).with_observer(Arc::clone(&self.observer));
        let decoder =
            SafeDecoder::new((self.decoder_factory)()).with_observer(Arc::clone(&self.observer));

        Arc::new(
            CallSlicer::new(&self.config, channel, decoder, Box::new(filter))
                .with_clock(Arc::clone(&self.clock))
                .with_observer(Arc::clone(&self.observer)),
        )
    }
}
