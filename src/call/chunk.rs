//! Data types flowing through the call pipeline.

use crate::checkpoint::{Checkpoint, release_all};
use crate::protocol::{ChannelId, Frame};

/// A decoded frame plus the envelope it arrived in.
#[derive(Debug, Clone)]
pub struct CheckpointedFrame {
    /// Arrival timestamp from the stream, epoch milliseconds.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub frame: Frame,
    pub checkpoint: Checkpoint,
}

impl CheckpointedFrame {
    pub fn new(
        timestamp: i64,
        latitude: f64,
        longitude: f64,
        frame: Frame,
        checkpoint: Checkpoint,
    ) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            frame,
            checkpoint,
        }
    }
}

/// One bounded segment of a call's decoded audio.
///
/// A call's chunks, concatenated in emission order, are the call's audio.
/// Exactly one chunk per call is `is_first` and exactly one is `is_last`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub channel_id: ChannelId,
    pub is_first: bool,
    pub is_last: bool,
    /// Closed by an explicit terminator rather than by timeout or inactivity.
    pub terminated: bool,
    /// Earliest frame timestamp that contributed to this chunk.
    pub start_time: Option<i64>,
    /// Latest frame timestamp that contributed to this chunk.
    pub end_time: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    pub source_id: u32,
    /// Normalized PCM samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub checkpoints: Vec<Checkpoint>,
}

impl AudioChunk {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Release every checkpoint carried by this chunk.
    pub fn checkpoint(&self) {
        release_all(&self.checkpoints);
    }
}
