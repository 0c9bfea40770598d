//! Logical channel addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one logical traffic channel.
///
/// The textual form (`Display`) doubles as the registry key and as the path
/// part of uploaded object keys:
/// `{wacn}/{system_id}/{rf_subsystem_id}/{TYPE}:{source_id}:{destination}[:{frequency}]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelId {
    /// Unit-to-unit call.
    #[serde(rename = "TRAFFIC_DIRECT")]
    Direct {
        wacn: u32,
        system_id: u32,
        rf_subsystem_id: u32,
        source_id: u32,
        destination_id: u32,
    },
    /// Talkgroup call.
    #[serde(rename = "TRAFFIC_GROUP")]
    Group {
        wacn: u32,
        system_id: u32,
        rf_subsystem_id: u32,
        source_id: u32,
        group_id: u32,
        frequency: f64,
    },
}

impl ChannelId {
    pub fn direct(
        wacn: u32,
        system_id: u32,
        rf_subsystem_id: u32,
        source_id: u32,
        destination_id: u32,
    ) -> Self {
        ChannelId::Direct {
            wacn,
            system_id,
            rf_subsystem_id,
            source_id,
            destination_id,
        }
    }

    pub fn group(
        wacn: u32,
        system_id: u32,
        rf_subsystem_id: u32,
        source_id: u32,
        group_id: u32,
        frequency: f64,
    ) -> Self {
        ChannelId::Group {
            wacn,
            system_id,
            rf_subsystem_id,
            source_id,
            group_id,
            frequency,
        }
    }

    /// Transmitting unit, or [`UNIT_ID_NONE`](crate::defaults::UNIT_ID_NONE).
    pub fn source_id(&self) -> u32 {
        match self {
            ChannelId::Direct { source_id, .. } | ChannelId::Group { source_id, .. } => *source_id,
        }
    }

    /// Same addressing with the source unit replaced.
    pub fn with_source_id(self, source: u32) -> Self {
        match self {
            ChannelId::Direct {
                wacn,
                system_id,
                rf_subsystem_id,
                destination_id,
                ..
            } => ChannelId::direct(wacn, system_id, rf_subsystem_id, source, destination_id),
            ChannelId::Group {
                wacn,
                system_id,
                rf_subsystem_id,
                group_id,
                frequency,
                ..
            } => ChannelId::group(
                wacn,
                system_id,
                rf_subsystem_id,
                source,
                group_id,
                frequency,
            ),
        }
    }

    /// Wire name of the addressing variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChannelId::Direct { .. } => "TRAFFIC_DIRECT",
            ChannelId::Group { .. } => "TRAFFIC_GROUP",
        }
    }

    /// Registry key for this channel.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Direct {
                wacn,
                system_id,
                rf_subsystem_id,
                source_id,
                destination_id,
            } => write!(
                f,
                "{}/{}/{}/{}:{}:{}",
                wacn,
                system_id,
                rf_subsystem_id,
                self.kind_name(),
                source_id,
                destination_id
            ),
            ChannelId::Group {
                wacn,
                system_id,
                rf_subsystem_id,
                source_id,
                group_id,
                frequency,
            } => write!(
                f,
                // `{:?}` keeps the decimal point on whole frequencies: `851.0`, not `851`.
                "{}/{}/{}/{}:{}:{}:{:?}",
                wacn,
                system_id,
                rf_subsystem_id,
                self.kind_name(),
                source_id,
                group_id,
                frequency
            ),
        }
    }
}
