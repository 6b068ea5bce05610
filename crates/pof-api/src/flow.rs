// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Flow tables, flow entries, and the other controller-installed
//! resources.

use super::Action;
use super::DEFAULT_PORT_MTU;
use super::Instruction;
use super::MAX_FIELD_LEN_BYTES;
use super::METADATA_FIELD_ID;
use super::TableType;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// A field value or mask: up to [`MAX_FIELD_LEN_BYTES`], left-justified.
pub type FieldBytes = heapless::Vec<u8, MAX_FIELD_LEN_BYTES>;

/// A bit range in either the packet window or the metadata buffer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Match {
    pub field_id: u16,
    pub offset_bits: u16,
    pub len_bits: u16,
}

impl Match {
    pub fn packet(offset_bits: u16, len_bits: u16) -> Self {
        Self { field_id: 0, offset_bits, len_bits }
    }

    pub fn metadata(offset_bits: u16, len_bits: u16) -> Self {
        Self { field_id: METADATA_FIELD_ID, offset_bits, len_bits }
    }

    pub fn is_metadata(&self) -> bool {
        self.field_id == METADATA_FIELD_ID
    }

    /// The number of key bytes this field occupies.
    pub fn len_bytes(&self) -> usize {
        (self.len_bits as usize).div_ceil(8)
    }
}

impl Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_metadata() {
            write!(f, "md[{}+{}]", self.offset_bits, self.len_bits)
        } else {
            write!(
                f,
                "f{}[{}+{}]",
                self.field_id, self.offset_bits, self.len_bits
            )
        }
    }
}

/// A field plus the value and mask an entry matches it against.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MatchX {
    pub field: Match,
    pub value: FieldBytes,
    pub mask: FieldBytes,
}

impl MatchX {
    /// Build a match from slices, truncating anything beyond
    /// [`MAX_FIELD_LEN_BYTES`].
    pub fn new(field: Match, value: &[u8], mask: &[u8]) -> Self {
        let take = |bytes: &[u8]| {
            let n = bytes.len().min(MAX_FIELD_LEN_BYTES);
            let mut out = FieldBytes::new();
            // Cannot fail: `n` never exceeds the capacity.
            let _ = out.extend_from_slice(&bytes[..n]);
            out
        };

        Self { field, value: take(value), mask: take(mask) }
    }

    /// Return the value and mask as fixed-size, zero-padded arrays.
    pub fn padded(
        &self,
    ) -> ([u8; MAX_FIELD_LEN_BYTES], [u8; MAX_FIELD_LEN_BYTES]) {
        let mut value = [0u8; MAX_FIELD_LEN_BYTES];
        let mut mask = [0u8; MAX_FIELD_LEN_BYTES];
        value[..self.value.len()].copy_from_slice(&self.value);
        mask[..self.mask.len()].copy_from_slice(&self.mask);
        (value, mask)
    }

    /// Two matches are duplicates when they address the same field
    /// and agree on every masked value bit.
    pub fn same_key(&self, other: &Self) -> bool {
        if self.field != other.field {
            return false;
        }

        let (av, am) = self.padded();
        let (bv, bm) = other.padded();
        let n = self.field.len_bytes().min(MAX_FIELD_LEN_BYTES);
        (0..n).all(|i| am[i] == bm[i] && (av[i] & am[i]) == (bv[i] & bm[i]))
    }
}

impl Display for MatchX {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}=", self.field)?;
        for b in self.value.iter() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "/")?;
        for b in self.mask.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The description of a flow table, as sent by the controller.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowTableDesc {
    pub table_type: TableType,
    /// The ID of the table within its type, not the global ID.
    pub table_id: u8,
    pub name: String,
    /// The number of entry slots.
    pub size: u32,
    /// The key length in bits.
    pub key_len: u16,
    /// The fields a lookup in this table extracts, in key order.
    pub match_fields: Vec<Match>,
}

/// A flow entry. `index` addresses a pre-allocated slot of the table
/// named by `(table_type, table_id)`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowEntry {
    pub table_type: TableType,
    pub table_id: u8,
    pub index: u32,
    pub priority: u16,
    pub counter_id: u32,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub matches: Vec<MatchX>,
    pub instructions: Vec<Instruction>,
}

impl FlowEntry {
    pub fn masked_cookie(&self) -> u64 {
        self.cookie & self.cookie_mask
    }
}

/// A reusable action list.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Group {
    pub group_id: u32,
    pub counter_id: u32,
    pub actions: Vec<Action>,
}

/// A meter. The rate is recorded on each packet that passes a METER
/// instruction but nothing enforces it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Meter {
    pub meter_id: u32,
    pub rate: u32,
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
    pub struct PortState: u32 {
        const LINK_DOWN = 1 << 0;
        const BLOCKED = 1 << 1;
        const LIVE = 1 << 2;
    }
}

/// A switch port.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortDesc {
    pub port_id: u32,
    pub name: String,
    pub hw_addr: [u8; 6],
    pub state: PortState,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    /// Ports come up disabled until the controller enables them.
    #[serde(default)]
    pub of_enable: bool,
}

fn default_mtu() -> usize {
    DEFAULT_PORT_MTU
}

impl PortDesc {
    pub fn new(port_id: u32, name: &str, hw_addr: [u8; 6]) -> Self {
        Self {
            port_id,
            name: name.into(),
            hw_addr,
            state: PortState::LIVE,
            mtu: DEFAULT_PORT_MTU,
            of_enable: false,
        }
    }
}
