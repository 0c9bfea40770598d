//! Call reassembly and WAV artifact production.

pub mod sender;
pub mod sink;
pub mod writer;

pub use sender::{CallSender, UploadContext};
pub use sink::CallAggregator;
pub use writer::{encode_wav, read_wav_samples};
