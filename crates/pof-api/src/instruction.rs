// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::Action;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// A pipeline-level operation carried by a flow entry.
///
/// Table IDs are global IDs. `packet_offset` on the two GOTO
/// instructions is in bytes and moves the start of the packet window
/// forward before the next table looks at it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Instruction {
    GotoTable {
        next_table_id: u8,
        packet_offset: u16,
    },

    /// Jump straight to a slot of a Linear table without a lookup.
    GotoDirectTable {
        next_table_id: u8,
        table_entry_index: u32,
        packet_offset: u16,
    },

    Meter {
        meter_id: u32,
    },

    /// Write a value of at most 32 bits into metadata.
    WriteMetadata {
        metadata_offset: u16,
        len: u16,
        value: u32,
    },

    WriteMetadataFromPacket {
        metadata_offset: u16,
        packet_offset: u16,
        len: u16,
    },

    ApplyActions(Vec<Action>),

    WriteActions(Vec<Action>),

    ClearActions,

    Experimenter,
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GotoTable { .. } => "GOTO_TABLE",
            Self::GotoDirectTable { .. } => "GOTO_DIRECT_TABLE",
            Self::Meter { .. } => "METER",
            Self::WriteMetadata { .. } => "WRITE_METADATA",
            Self::WriteMetadataFromPacket { .. } => {
                "WRITE_METADATA_FROM_PACKET"
            }
            Self::ApplyActions(_) => "APPLY_ACTIONS",
            Self::WriteActions(_) => "WRITE_ACTIONS",
            Self::ClearActions => "CLEAR_ACTIONS",
            Self::Experimenter => "EXPERIMENTER",
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::GotoTable { next_table_id, packet_offset } => {
                write!(f, "goto({} +{})", next_table_id, packet_offset)
            }
            Self::GotoDirectTable {
                next_table_id,
                table_entry_index,
                packet_offset,
            } => write!(
                f,
                "goto-direct({}[{}] +{})",
                next_table_id, table_entry_index, packet_offset
            ),
            Self::Meter { meter_id } => write!(f, "meter({})", meter_id),
            Self::WriteMetadata { metadata_offset, len, value } => {
                write!(f, "md[{}+{}]={:#x}", metadata_offset, len, value)
            }
            Self::WriteMetadataFromPacket {
                metadata_offset,
                packet_offset,
                len,
            } => write!(
                f,
                "md[{}+{}]=pkt[{}]",
                metadata_offset, len, packet_offset
            ),
            Self::ApplyActions(acts) | Self::WriteActions(acts) => {
                write!(f, "{}[", self.name().to_ascii_lowercase())?;
                for (i, a) in acts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, "]")
            }
            Self::ClearActions => write!(f, "clear-actions"),
            Self::Experimenter => write!(f, "experimenter"),
        }
    }
}
