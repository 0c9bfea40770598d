//! Decoded radio protocol types consumed by the call pipeline.
//!
//! Bit-level decoding happens upstream; these are the typed results.

pub mod channel;
pub mod frame;

pub use channel::ChannelId;
pub use frame::{Frame, LinkControl, VoiceFrame};
