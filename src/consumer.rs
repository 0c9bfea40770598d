//! Entry point from the frame stream into the call pipeline.

use crate::call::chunk::CheckpointedFrame;
use crate::call::manager::CallManager;
use crate::checkpoint::Checkpoint;
use crate::error::{CallError, Result};
use crate::protocol::{ChannelId, Frame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Channel a stream record was observed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamChannel {
    /// Voice traffic, direct or group addressed.
    Traffic(ChannelId),
    /// Control or any other non-traffic channel.
    Other {
        #[serde(rename = "type")]
        kind: String,
    },
}

/// One record of the decoded frame stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Observation time, epoch milliseconds.
    pub time_ms: i64,
    pub channel: StreamChannel,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    pub frame: Frame,
    /// Whether the frame passed its integrity checks upstream.
    #[serde(default = "default_intact")]
    pub intact: bool,
}

fn default_intact() -> bool {
    true
}

/// Routes stream records into a [`CallManager`].
pub struct FrameConsumer {
    manager: Arc<CallManager>,
}

impl FrameConsumer {
    pub fn new(manager: Arc<CallManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CallManager> {
        &self.manager
    }

    /// Process one record.
    ///
    /// Non-traffic records are acknowledged and skipped. A damaged traffic
    /// frame is an error the caller must treat as fatal; its checkpoint is
    /// left unreleased.
    pub fn process(&self, record: StreamRecord, checkpoint: Checkpoint) -> Result<()> {
        let channel = match record.channel {
            StreamChannel::Traffic(channel) => channel,
            StreamChannel::Other { kind } => {
                tracing::trace!(%kind, "skipping non-traffic record");
                checkpoint.checkpoint();
                return Ok(());
            }
        };

        if !record.intact {
            return Err(CallError::CorruptFrame {
                channel: channel.to_string(),
                detail: format!("{} frame failed integrity check", record.frame.name()),
            });
        }

        self.manager.process(
            channel,
            CheckpointedFrame::new(
                record.time_ms,
                record.latitude,
                record.longitude,
                record.frame,
                checkpoint,
            ),
        );
        Ok(())
    }
}
