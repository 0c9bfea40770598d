use crate::call::chunk::AudioChunk;
use crate::call::sink::ChunkSink;
use crate::wav::sender::{CallSender, UploadContext};
use std::collections::HashMap;

/// Terminal chunk sink: reassembles calls and uploads them as WAV artifacts.
///
/// One [`CallSender`] is open per channel between a call's first and last
/// chunk. Chunks arriving out of that order mean the slicer broke its own
/// contract, so the aggregator panics rather than guess.
pub struct CallAggregator {
    senders: HashMap<String, CallSender>,
    ctx: UploadContext,
}

impl CallAggregator {
    pub fn new(ctx: UploadContext) -> Self {
        Self {
            senders: HashMap::new(),
            ctx,
        }
    }

    /// Calls with chunks queued but no last chunk yet.
    pub fn open_calls(&self) -> usize {
        self.senders.len()
    }

    fn finalize(&self, sender: CallSender) {
        let channel = sender.resolved_channel_id();
        if let Err(e) = sender.finalize(&self.ctx) {
            // Checkpoints stay unreleased; the source redelivers the call.
            tracing::error!(%channel, error = %e, "failed to build call artifact");
        }
    }
}

impl ChunkSink for CallAggregator {
    fn consume(&mut self, chunk: AudioChunk) {
        let key = chunk.channel_id.key();
        match (chunk.is_first, chunk.is_last) {
            (true, false) => {
                if self.senders.contains_key(&key) {
                    panic!("call already open for channel {key}");
                }
                self.senders.insert(key, CallSender::new(chunk));
            }
            (false, false) => match self.senders.get_mut(&key) {
                Some(sender) => sender.queue(chunk),
                None => panic!("no open call for intermediate chunk on channel {key}"),
            },
            (false, true) => match self.senders.remove(&key) {
                Some(mut sender) => {
                    sender.queue(chunk);
                    self.finalize(sender);
                }
                None => panic!("no open call for last chunk on channel {key}"),
            },
            (true, true) => self.finalize(CallSender::new(chunk)),
        }
    }

    fn name(&self) -> &'static str {
        "call-aggregator"
    }
}
