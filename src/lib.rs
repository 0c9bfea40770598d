//! callslicer - Radio call segmentation
//!
//! Turns a stream of decoded trunked-radio frames into per-call WAV artifacts
//! in blob storage, acknowledging stream positions only once the audio they
//! carried is durably stored.

// Error handling discipline: propagate, don't panic
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod call;
pub mod checkpoint;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod defaults;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod protocol;
pub mod source;
pub mod storage;
pub mod wav;

// Composition root - needs everything
pub mod app;

// Core traits (frames → pipeline → sink → store)
pub use call::decoder::VoiceDecoder;
pub use call::sink::ChunkSink;
pub use call::slicer::CallPipeline;
pub use clock::Clock;
pub use observer::CallObserver;
pub use pipeline::CallPipelineFactory;
pub use storage::BlobStore;

// Call pipeline
pub use call::{CallManager, CallSlicer, SanityFilter, SweeperHandle};
pub use wav::CallAggregator;

// Stream plumbing
pub use checkpoint::{Checkpoint, CheckpointTracker};
pub use consumer::{FrameConsumer, StreamRecord};
pub use protocol::{ChannelId, Frame};

// Error handling
pub use error::{CallError, Result};

// Config
pub use config::{CallConfig, Config, StorageBackend};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
