// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Actions: the per-packet mutations and terminal operations carried
//! by APPLY_ACTIONS instructions and groups.
//!
//! Every offset and length is in bits. Packet offsets are relative to
//! the start of the packet's current window, except for
//! `Output::packet_offset`, which is absolute from the first byte of
//! the frame.

use super::Match;
use super::MatchX;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Action {
    /// Send `metadata[metadata_offset..+metadata_len]` followed by
    /// the frame bytes from `packet_offset` to the end of the window.
    Output {
        port_id: u32,
        metadata_offset: u16,
        metadata_len: u16,
        packet_offset: u16,
    },

    Drop {
        reason_code: u32,
    },

    /// Send the frame up to the controller.
    PacketIn {
        reason_code: u32,
    },

    /// Write `value & mask` into a packet field.
    SetField(MatchX),

    SetFieldFromMetadata {
        field: Match,
        metadata_offset: u16,
    },

    /// Add a signed increment to a field of at most 32 bits.
    ModifyField {
        field: Match,
        increment: i32,
    },

    /// Insert a tag of at most 64 bits, shifting the rest of the
    /// packet right.
    AddField {
        tag_id: u16,
        tag_pos: u16,
        tag_len: u16,
        tag_value: u64,
    },

    DeleteField {
        tag_pos: u16,
        tag_len: u16,
    },

    CalculateChecksum {
        checksum_pos: u16,
        checksum_len: u16,
        cal_startpos: u16,
        cal_len: u16,
    },

    Counter {
        counter_id: u32,
    },

    Group {
        group_id: u32,
    },

    Experimenter,
}

impl Action {
    /// A short name, used in probes and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Output { .. } => "OUTPUT",
            Self::Drop { .. } => "DROP",
            Self::PacketIn { .. } => "PACKET_IN",
            Self::SetField(_) => "SET_FIELD",
            Self::SetFieldFromMetadata { .. } => "SET_FIELD_FROM_METADATA",
            Self::ModifyField { .. } => "MODIFY_FIELD",
            Self::AddField { .. } => "ADD_FIELD",
            Self::DeleteField { .. } => "DELETE_FIELD",
            Self::CalculateChecksum { .. } => "CALCULATE_CHECKSUM",
            Self::Counter { .. } => "COUNTER",
            Self::Group { .. } => "GROUP",
            Self::Experimenter => "EXPERIMENTER",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Output {
                port_id,
                metadata_offset,
                metadata_len,
                packet_offset,
            } => write!(
                f,
                "output(port={} md={}+{} pkt={})",
                port_id, metadata_offset, metadata_len, packet_offset
            ),
            Self::Drop { reason_code } => write!(f, "drop({})", reason_code),
            Self::PacketIn { reason_code } => {
                write!(f, "packet-in({})", reason_code)
            }
            Self::SetField(mx) => write!(f, "set({})", mx),
            Self::SetFieldFromMetadata { field, metadata_offset } => {
                write!(f, "set({}<-md@{})", field, metadata_offset)
            }
            Self::ModifyField { field, increment } => {
                write!(f, "modify({}{:+})", field, increment)
            }
            Self::AddField { tag_id, tag_pos, tag_len, tag_value } => write!(
                f,
                "add-field(id={} {}+{}={:#x})",
                tag_id, tag_pos, tag_len, tag_value
            ),
            Self::DeleteField { tag_pos, tag_len } => {
                write!(f, "del-field({}+{})", tag_pos, tag_len)
            }
            Self::CalculateChecksum {
                checksum_pos,
                checksum_len,
                cal_startpos,
                cal_len,
            } => write!(
                f,
                "checksum({}+{} over {}+{})",
                checksum_pos, checksum_len, cal_startpos, cal_len
            ),
            Self::Counter { counter_id } => write!(f, "counter({})", counter_id),
            Self::Group { group_id } => write!(f, "group({})", group_id),
            Self::Experimenter => write!(f, "experimenter"),
        }
    }
}
