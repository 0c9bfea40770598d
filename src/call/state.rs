//! Mutable accumulator for the call (and chunk) currently open on a channel.

use crate::checkpoint::Checkpoint;
use crate::defaults::UNIT_ID_NONE;

/// Everything known about the open call that is not audio.
///
/// Two reset granularities exist: [`next_chunk`](Self::next_chunk) clears
/// chunk-scoped fields (time bounds, checkpoints) while keeping call-level
/// ones, [`next_call`](Self::next_call) clears everything.
#[derive(Debug)]
pub struct CallState {
    is_first: bool,
    is_encrypted: bool,
    latitude: f64,
    longitude: f64,
    source_id: u32,
    earliest_time: Option<i64>,
    latest_time: Option<i64>,
    checkpoints: Vec<Checkpoint>,
}

impl Default for CallState {
    fn default() -> Self {
        Self {
            is_first: true,
            is_encrypted: false,
            latitude: 0.0,
            longitude: 0.0,
            source_id: UNIT_ID_NONE,
            earliest_time: None,
            latest_time: None,
            checkpoints: Vec::new(),
        }
    }
}

impl CallState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for the next chunk of the same call.
    pub fn next_chunk(&mut self) {
        self.is_first = false;
        self.earliest_time = None;
        self.latest_time = None;
        self.checkpoints = Vec::new();
    }

    /// Reset for a new call.
    pub fn next_call(&mut self) {
        *self = Self::default();
    }

    pub fn is_first(&self) -> bool {
        self.is_first
    }

    pub fn is_encrypted(&self) -> bool {
        self.is_encrypted
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.is_encrypted = encrypted;
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn set_coordinates(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = longitude;
    }

    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Adopt a source unit; the "none" sentinel never overwrites a known one.
    pub fn set_source_id(&mut self, source_id: u32) {
        if source_id != UNIT_ID_NONE {
            self.source_id = source_id;
        }
    }

    pub fn earliest_time(&self) -> Option<i64> {
        self.earliest_time
    }

    pub fn set_earliest_time_if_less(&mut self, time: i64) {
        if self.earliest_time.is_none_or(|earliest| time < earliest) {
            self.earliest_time = Some(time);
        }
    }

    pub fn latest_time(&self) -> Option<i64> {
        self.latest_time
    }

    pub fn set_latest_time_if_more(&mut self, time: i64) {
        if self.latest_time.is_none_or(|latest| time > latest) {
            self.latest_time = Some(time);
        }
    }

    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Hand the pending checkpoints to an outgoing chunk.
    pub fn take_checkpoints(&mut self) -> Vec<Checkpoint> {
        std::mem::take(&mut self.checkpoints)
    }
}
