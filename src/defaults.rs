//! Default configuration constants for callslicer.
//!
//! Shared between the configuration types, the call slicer and the WAV writer
//! so the same values are never spelled twice.

/// Output sample rate in Hz. The voice codec produces 8kHz audio.
pub const SAMPLE_RATE: u32 = 8000;

/// Output channel count.
pub const CHANNEL_COUNT: u16 = 1;

/// Output bits per sample.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Algorithm id that marks a transmission as unencrypted.
pub const ALGORITHM_CLEAR: u8 = 0x80;

/// Source unit id meaning "not known yet".
pub const UNIT_ID_NONE: u32 = 0;

/// Number of silent samples substituted when a voice frame fails to decode.
pub const DECODE_FAILURE_SAMPLES: usize = 10;

/// Minimum rate of data units (per second) that keeps a call alive.
///
/// At 2.0 a channel is considered inactive 500ms after its last frame.
pub const MIN_FRAME_RATE: f64 = 2.0;

/// How often (per second) the registry sweeps for inactive channels.
pub const INACTIVE_CHECK_RATE: f64 = 1.0;

/// Maximum gap between frame timestamps before a call is closed without a terminator.
pub const TERMINATOR_TIMEOUT_MS: i64 = 1000;

/// Sample capacity of one audio chunk (10 seconds at 8kHz).
pub const MAX_CHUNK_SAMPLES: usize = 80_000;

/// Object key prefix for uploaded calls.
pub const KEY_PREFIX: &str = "calls/";

/// Bounded queue between the stream reader and the frame processor.
pub const SOURCE_QUEUE_SIZE: usize = 1024;

/// Released records allowed to wait behind one unreleased record before the
/// consumer stops.
pub const MAX_HELD_CHECKPOINTS: usize = 100_000;

/// How long shutdown waits for in-flight uploads.
pub const DRAIN_TIMEOUT: &str = "30s";

/// Artifacts at least this large are uploaded in parts.
pub const MULTIPART_THRESHOLD_BYTES: usize = 8 * 1024 * 1024;

/// Part size for multipart uploads. Every part but the last must be at least 5 MiB on S3.
pub const MULTIPART_PART_BYTES: usize = 5 * 1024 * 1024;

/// Default region for the S3 backend.
pub const S3_REGION: &str = "us-east-1";

/// Default root directory for the local filesystem backend.
pub const LOCAL_ROOT: &str = "./calls";
