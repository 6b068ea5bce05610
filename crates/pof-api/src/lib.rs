// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod action;
pub mod cmd;
pub mod error;
pub mod flow;
pub mod instruction;

pub use action::*;
pub use cmd::*;
pub use error::*;
pub use flow::*;
pub use instruction::*;

/// The overall version of the admin API. Anytime a command is added,
/// removed, or modified, this number should increment. The control
/// thread refuses any request whose version differs from its own.
pub const API_VERSION: u64 = 1;

/// The capacity of the raw packet buffer owned by each in-flight
/// packet. Frames larger than this are refused at ingress, and
/// ADD_FIELD may never grow a packet past it.
pub const PACKET_RAW_MAX_LEN: usize = 2048;

/// The size of the per-packet metadata buffer.
pub const METADATA_MAX_LEN: usize = 128;

/// The size of the `{len, port_id, reserve}` header at the front of
/// the metadata buffer.
pub const METADATA_HDR_LEN: usize = 4;

/// A `Match::field_id` of this value addresses the metadata buffer
/// instead of the packet.
pub const METADATA_FIELD_ID: u16 = 0xFFFF;

/// The global ID of the table every packet starts in.
pub const FIRST_TABLE_ID: u8 = 0;

/// The largest field a match, SET_FIELD or key may address.
pub const MAX_FIELD_LEN_BYTES: usize = 20;

/// The largest number of key fields a table may declare.
pub const MAX_MATCH_FIELD_NUM: usize = 8;

/// The largest upcall payload the switch will send.
pub const PACKET_IN_MAX_LEN: usize = 2048;

/// Upcalls never reference a buffered packet.
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// The default MTU of a port: an Ethernet payload plus its header.
pub const DEFAULT_PORT_MTU: usize = 1500 + 14;

/// Table-transition budget for a single packet.
pub const MAX_TABLE_HOPS: usize = 256;

/// Nesting budget for GROUP actions run by a single action list.
pub const MAX_GROUP_DEPTH: usize = 16;

/// Default resource limits, used when the switch configuration does
/// not override them.
pub mod defaults {
    pub const MM_TABLE_NUM: u8 = 6;
    pub const LPM_TABLE_NUM: u8 = 3;
    pub const EM_TABLE_NUM: u8 = 3;
    pub const LINEAR_TABLE_NUM: u8 = 9;
    pub const FLOW_TABLE_SIZE: u32 = 8000;
    pub const FLOW_TABLE_KEY_LEN: u16 = 160;
    pub const METER_NUM: u32 = 256;
    pub const COUNTER_NUM: u32 = 512;
    pub const GROUP_NUM: u32 = 128;
    pub const PORT_NUM_MAX: u32 = 16;
    pub const QUEUE_DEPTH: usize = 1024;
}

/// The four kinds of flow table. The discriminant is both the wire
/// value and the order in which global table IDs are allocated.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum TableType {
    Mm = 0,
    Lpm = 1,
    Em = 2,
    Linear = 3,
}

impl TableType {
    pub const ALL: [TableType; 4] =
        [TableType::Mm, TableType::Lpm, TableType::Em, TableType::Linear];

    pub fn idx(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for TableType {
    type Error = PofError;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        match num {
            0 => Ok(Self::Mm),
            1 => Ok(Self::Lpm),
            2 => Ok(Self::Em),
            3 => Ok(Self::Linear),
            _ => Err(PofError::BadTableType(num)),
        }
    }
}

impl core::str::FromStr for TableType {
    type Err = alloc::string::String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mm" => Ok(Self::Mm),
            "lpm" => Ok(Self::Lpm),
            "em" => Ok(Self::Em),
            "linear" | "dt" => Ok(Self::Linear),
            _ => Err(format!("invalid table type: {}", s)),
        }
    }
}

impl Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Mm => "MM",
            Self::Lpm => "LPM",
            Self::Em => "EM",
            Self::Linear => "LINEAR",
        };

        write!(f, "{}", s)
    }
}
