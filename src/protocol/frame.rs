//! Typed data units.

use crate::defaults::{ALGORITHM_CLEAR, UNIT_ID_NONE};
use serde::{Deserialize, Serialize};

/// Link control opcode: group voice channel user.
pub const LCF_GROUP_VOICE_USER: u8 = 0x00;
/// Link control opcode: unit-to-unit voice channel user.
pub const LCF_UNIT_VOICE_USER: u8 = 0x03;

/// One compressed voice payload, opaque to everything but the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceFrame {
    pub bytes: Vec<u8>,
}

impl VoiceFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Link control word embedded in logical link data unit A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkControl {
    pub opcode: u8,
    #[serde(default)]
    pub source_id: u32,
}

impl LinkControl {
    pub fn group_voice_user(source_id: u32) -> Self {
        Self {
            opcode: LCF_GROUP_VOICE_USER,
            source_id,
        }
    }

    pub fn unit_voice_user(source_id: u32) -> Self {
        Self {
            opcode: LCF_UNIT_VOICE_USER,
            source_id,
        }
    }

    /// Transmitting unit, when this word is a voice user word that names one.
    pub fn voice_user_source(&self) -> Option<u32> {
        match self.opcode {
            LCF_GROUP_VOICE_USER | LCF_UNIT_VOICE_USER if self.source_id != UNIT_ID_NONE => {
                Some(self.source_id)
            }
            _ => None,
        }
    }
}

/// One decoded protocol data unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "duid", rename_all = "snake_case")]
pub enum Frame {
    /// Header data unit, opens a call.
    Header { algorithm_id: u8 },
    /// Terminator without link control, closes a call.
    Terminator,
    /// Terminator carrying a link control word.
    TerminatorWithLink,
    /// Logical link data unit 1: voice plus link control.
    LogicalLinkA {
        voice: Vec<VoiceFrame>,
        link_control: LinkControl,
    },
    /// Logical link data unit 2: voice plus encryption sync.
    LogicalLinkB {
        voice: Vec<VoiceFrame>,
        algorithm_id: u8,
    },
    /// Trunking signaling block.
    TrunkSignaling,
    /// Anything else.
    Other { id: u8 },
}

impl Frame {
    /// Short name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Header { .. } => "header",
            Frame::Terminator => "terminator",
            Frame::TerminatorWithLink => "terminator_with_link",
            Frame::LogicalLinkA { .. } => "logical_link_a",
            Frame::LogicalLinkB { .. } => "logical_link_b",
            Frame::TrunkSignaling => "trunk_signaling",
            Frame::Other { .. } => "other",
        }
    }
}

/// Whether an algorithm id denotes encrypted voice.
pub fn is_encrypted(algorithm_id: u8) -> bool {
    algorithm_id != ALGORITHM_CLEAR
}
