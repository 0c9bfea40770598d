//! Per-channel call segmentation state machine.
//!
//! Consumes the ordered frames of one channel and emits bounded audio chunks
//! flagged first / last / terminated. A call ends on a terminator, on the next
//! header, when the gap between frame timestamps exceeds the terminator
//! timeout, or when the channel goes quiet for longer than the inactivity
//! window (detected by [`CallPipeline::is_inactive`]).

use crate::call::chunk::{AudioChunk, CheckpointedFrame};
use crate::call::decoder::SafeDecoder;
use crate::call::sink::ChunkSink;
use crate::call::state::CallState;
use crate::clock::{Clock, SystemClock};
use crate::config::CallConfig;
use crate::observer::{CallObserver, NoopObserver};
use crate::protocol::frame::is_encrypted;
use crate::protocol::{ChannelId, Frame, VoiceFrame};
use std::sync::{Arc, Mutex, PoisonError};

/// One channel's pipeline as seen by the registry.
pub trait CallPipeline: Send + Sync {
    /// Feed the next frame of this channel.
    fn consume(&self, frame: CheckpointedFrame);

    /// Whether nothing has arrived since the inactivity deadline.
    ///
    /// Reporting `true` finalizes the open call as a side effect. Once it has
    /// done so, further checks report `false` until a new frame arrives.
    fn is_inactive(&self, now_millis: i64) -> bool;

    fn channel_id(&self) -> ChannelId;
}

/// Splits one channel's frame stream into calls and chunks.
pub struct CallSlicer {
    channel_id: ChannelId,
    inner: Mutex<SlicerInner>,
}

struct SlicerInner {
    channel_id: ChannelId,
    config: CallConfig,
    state: CallState,
    buffer: Vec<f32>,
    decoder: SafeDecoder,
    sink: Box<dyn ChunkSink>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn CallObserver>,
    /// Wall-clock time after which the channel counts as inactive.
    inactive_after: i64,
    /// The inactivity check already closed the call; nothing new since.
    finalized: bool,
}

impl CallSlicer {
    pub fn new(
        config: &CallConfig,
        channel_id: ChannelId,
        decoder: SafeDecoder,
        sink: Box<dyn ChunkSink>,
    ) -> Self {
        Self {
            channel_id,
            inner: Mutex::new(SlicerInner {
                channel_id,
                config: config.clone(),
                state: CallState::new(),
                buffer: Vec::with_capacity(config.max_chunk_samples),
                decoder,
                sink,
                clock: Arc::new(SystemClock),
                observer: Arc::new(NoopObserver),
                inactive_after: i64::MIN,
                finalized: false,
            }),
        }
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.inner_mut().clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.inner_mut().observer = observer;
        self
    }

    fn inner_mut(&mut self) -> &mut SlicerInner {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CallPipeline for CallSlicer {
    fn consume(&self, frame: CheckpointedFrame) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.consume(frame);
    }

    fn is_inactive(&self, now_millis: i64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.finalized || now_millis <= inner.inactive_after {
            return false;
        }
        inner.flush_last(false);
        inner.finalized = true;
        true
    }

    fn channel_id(&self) -> ChannelId {
        self.channel_id
    }
}

impl SlicerInner {
    fn consume(&mut self, envelope: CheckpointedFrame) {
        let CheckpointedFrame {
            timestamp,
            latitude,
            longitude,
            frame,
            checkpoint,
        } = envelope;

        self.inactive_after = self
            .clock
            .now_millis()
            .saturating_add(self.config.inactivity_window_ms());
        self.finalized = false;

        self.check_terminator_timeout(timestamp);
        self.state.set_latest_time_if_more(timestamp);
        self.state.set_coordinates(latitude, longitude);
        self.state.add_checkpoint(checkpoint);

        match frame {
            Frame::Header { algorithm_id } => {
                self.observer.header_frame();
                self.flush_last(false);
                self.state.set_encrypted(is_encrypted(algorithm_id));
                self.state.set_earliest_time_if_less(timestamp);
            }
            Frame::LogicalLinkB {
                voice,
                algorithm_id,
            } => {
                self.state.set_encrypted(is_encrypted(algorithm_id));
                self.state.set_earliest_time_if_less(timestamp);
                self.queue_voice(&voice);
            }
            Frame::LogicalLinkA {
                voice,
                link_control,
            } => {
                self.state.set_earliest_time_if_less(timestamp);
                if let Some(source_id) = link_control.voice_user_source() {
                    self.state.set_source_id(source_id);
                }
                self.queue_voice(&voice);
            }
            Frame::Terminator => {
                self.observer.terminator_frame();
                self.state.set_earliest_time_if_less(timestamp);
                self.flush_last(true);
            }
            // No audio effect; the checkpoint rides along with whichever chunk flushes next.
            Frame::TerminatorWithLink | Frame::TrunkSignaling | Frame::Other { .. } => {}
        }
    }

    fn check_terminator_timeout(&mut self, timestamp: i64) {
        let Some(latest) = self.state.latest_time() else {
            return;
        };
        if timestamp.saturating_sub(latest) > self.config.terminator_timeout_ms {
            tracing::warn!(
                channel = %self.channel_id,
                gap_ms = timestamp.saturating_sub(latest),
                "timed out waiting for terminating data unit"
            );
            self.observer.terminator_timeout(&self.channel_id);
            self.flush_last(false);
        }
    }

    fn queue_voice(&mut self, voice: &[VoiceFrame]) {
        let encrypted = self.state.is_encrypted();
        self.observer.voice_frame(encrypted);
        if encrypted {
            return;
        }

        for frame in voice {
            let audio = self.decoder.decode(&frame.bytes);
            let remaining = self
                .config
                .max_chunk_samples
                .saturating_sub(self.buffer.len());
            // A frame larger than the whole buffer still goes out in one chunk.
            if remaining < audio.len() && !self.buffer.is_empty() {
                let samples = self.take_buffer();
                let chunk = self.make_chunk(samples, false, false);
                self.state.next_chunk();
                self.emit(chunk);
            }
            self.buffer.extend_from_slice(&audio);
        }
    }

    /// Close the open call, emitting whatever it holds as its last chunk.
    fn flush_last(&mut self, terminated: bool) {
        let samples = self.take_buffer();
        let chunk = self.make_chunk(samples, true, terminated);
        self.state.next_call();
        self.emit(chunk);
    }

    fn take_buffer(&mut self) -> Vec<f32> {
        std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.config.max_chunk_samples),
        )
    }

    fn make_chunk(&mut self, samples: Vec<f32>, is_last: bool, terminated: bool) -> AudioChunk {
        AudioChunk {
            channel_id: self.channel_id,
            is_first: self.state.is_first(),
            is_last,
            terminated,
            start_time: self.state.earliest_time(),
            end_time: self.state.latest_time(),
            latitude: self.state.latitude(),
            longitude: self.state.longitude(),
            source_id: self.state.source_id(),
            samples,
            checkpoints: self.state.take_checkpoints(),
        }
    }

    fn emit(&mut self, chunk: AudioChunk) {
        tracing::debug!(
            channel = %self.channel_id,
            first = chunk.is_first,
            last = chunk.is_last,
            terminated = chunk.terminated,
            samples = chunk.samples.len(),
            checkpoints = chunk.checkpoints.len(),
            "chunk emitted"
        );
        self.sink.consume(chunk);
    }
}
