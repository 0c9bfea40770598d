//! Call segmentation: frames in, bounded audio chunks out.

pub mod chunk;
pub mod decoder;
pub mod filter;
pub mod manager;
pub mod sink;
pub mod slicer;
pub mod state;

pub use chunk::{AudioChunk, CheckpointedFrame};
pub use decoder::{MockDecoder, PcmDecoder, SafeDecoder, VoiceDecoder};
pub use filter::SanityFilter;
pub use manager::{CallManager, SweeperHandle};
pub use sink::{ChunkSink, CollectorSink};
pub use slicer::{CallPipeline, CallSlicer};
pub use state::CallState;
