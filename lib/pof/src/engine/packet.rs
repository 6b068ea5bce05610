// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The per-packet state carried through the pipeline.
//!
//! A [`PacketContext`] owns a fixed-capacity copy of the frame plus a
//! *window* into it: `offset` bytes from the start, `left_len` bytes
//! long. GOTO instructions slide the window forward; ADD_FIELD and
//! DELETE_FIELD grow and shrink it. Every packet field an instruction
//! or action names is relative to the window.
//!
//! The metadata buffer travels with the packet. Its first four bytes
//! are a header, `{len: u16 BE, port_id: u8, reserve: u8}`, where
//! `len` tracks the current frame length. Everything after that is
//! scratch space for the controller's programs.

use super::bitfield::bits_to_bytes;
use pof_api::FlowEntry;
use pof_api::METADATA_MAX_LEN;
use pof_api::Match;
use pof_api::PACKET_RAW_MAX_LEN;
use pof_api::PofError;
use pof_api::TableType;
use std::sync::Arc;

type Result<T> = core::result::Result<T, PofError>;

pub struct PacketContext {
    raw: Box<[u8; PACKET_RAW_MAX_LEN]>,
    ori_len: usize,
    in_port: u32,
    offset: usize,
    left_len: usize,
    metadata: [u8; METADATA_MAX_LEN],
    table: Option<(TableType, u8)>,
    entry: Option<Arc<FlowEntry>>,
    rate: u32,
    done: bool,
}

impl PacketContext {
    /// Copy a received frame into a new context and initialize its
    /// metadata header.
    ///
    /// # Errors
    ///
    /// A frame longer than [`PACKET_RAW_MAX_LEN`] is refused with
    /// `PacketLenError`.
    pub fn new(frame: &[u8], in_port: u32) -> Result<Self> {
        if frame.len() > PACKET_RAW_MAX_LEN {
            return Err(PofError::PacketLenError);
        }

        let mut raw = Box::new([0u8; PACKET_RAW_MAX_LEN]);
        raw[..frame.len()].copy_from_slice(frame);

        let mut pkt = Self {
            raw,
            ori_len: frame.len(),
            in_port,
            offset: 0,
            left_len: frame.len(),
            metadata: [0u8; METADATA_MAX_LEN],
            table: None,
            entry: None,
            rate: 0,
            done: false,
        };
        // Cannot truncate: the frame fits in PACKET_RAW_MAX_LEN.
        pkt.set_metadata_len(frame.len() as u16);
        // The metadata header only has room for an 8-bit port.
        pkt.metadata[2] = in_port as u8;
        Ok(pkt)
    }

    pub fn ori_len(&self) -> usize {
        self.ori_len
    }

    pub fn in_port(&self) -> u32 {
        self.in_port
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn left_len(&self) -> usize {
        self.left_len
    }

    /// The end of the window, as an absolute byte position.
    pub fn end(&self) -> usize {
        self.offset + self.left_len
    }

    /// The frame from its first byte to the end of the window.
    pub fn frame(&self) -> &[u8] {
        &self.raw[..self.end()]
    }

    /// The current window.
    pub fn window(&self) -> &[u8] {
        &self.raw[self.offset..self.end()]
    }

    pub fn window_mut(&mut self) -> &mut [u8] {
        let end = self.end();
        &mut self.raw[self.offset..end]
    }

    /// Everything from the start of the window to the end of the raw
    /// buffer, for edits that grow the window.
    pub(crate) fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..]
    }

    /// Absolute bytes of the raw buffer.
    pub fn raw_range(&self, start: usize, end: usize) -> &[u8] {
        &self.raw[start..end]
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut [u8] {
        &mut self.metadata
    }

    /// The `len` field of the metadata header.
    pub fn metadata_len(&self) -> u16 {
        u16::from_be_bytes([self.metadata[0], self.metadata[1]])
    }

    pub(crate) fn set_metadata_len(&mut self, len: u16) {
        self.metadata[..2].copy_from_slice(&len.to_be_bytes());
    }

    /// The `(type, id)` of the table the packet is in.
    pub fn table(&self) -> Option<(TableType, u8)> {
        self.table
    }

    pub(crate) fn set_table(&mut self, table_type: TableType, table_id: u8) {
        self.table = Some((table_type, table_id));
    }

    /// The last entry the packet matched.
    pub fn entry(&self) -> Option<&Arc<FlowEntry>> {
        self.entry.as_ref()
    }

    pub(crate) fn set_entry(&mut self, entry: Arc<FlowEntry>) {
        self.entry = Some(entry);
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub(crate) fn set_rate(&mut self, rate: u32) {
        self.rate = rate;
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub(crate) fn set_done(&mut self) {
        self.done = true;
    }

    /// Slide the window forward by `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        if n > self.left_len {
            return Err(PofError::PacketLenError);
        }

        self.left_len -= n;
        self.offset += n;
        Ok(())
    }

    /// Grow the window by `n` bytes. The caller has checked the raw
    /// capacity.
    pub(crate) fn grow(&mut self, n: usize) {
        self.left_len += n;
        let len = self.metadata_len().wrapping_add(n as u16);
        self.set_metadata_len(len);
    }

    /// Set the window length after a deletion. The metadata length
    /// becomes the new frame length.
    pub(crate) fn shrink_to(&mut self, left_len: usize) {
        self.left_len = left_len;
        self.set_metadata_len(self.end() as u16);
    }

    /// Check that `field` fits in the window or the metadata buffer.
    pub fn check_field(&self, field: &Match) -> Result<()> {
        check_bits(
            field,
            field.offset_bits as usize,
            field.len_bits as usize,
            self.left_len,
        )
    }

    /// The buffer a field addresses, after bounds checking.
    pub fn field_buf(&self, field: &Match) -> Result<&[u8]> {
        self.check_field(field)?;
        if field.is_metadata() {
            Ok(&self.metadata)
        } else {
            Ok(self.window())
        }
    }

    pub fn field_buf_mut(&mut self, field: &Match) -> Result<&mut [u8]> {
        self.check_field(field)?;
        if field.is_metadata() {
            Ok(&mut self.metadata)
        } else {
            Ok(self.window_mut())
        }
    }
}

/// Check a bit range against the window (`left_len` bytes) or the
/// metadata buffer.
fn check_bits(
    field: &Match,
    offset: usize,
    len: usize,
    left_len: usize,
) -> Result<()> {
    if field.is_metadata() {
        if bits_to_bytes(offset + len) > METADATA_MAX_LEN {
            return Err(PofError::MetadataLenError);
        }
    } else if offset + len > left_len * 8 {
        return Err(PofError::PacketLenError);
    }

    Ok(())
}

/// Check a bit range of the metadata buffer.
pub fn check_metadata_bits(offset: usize, len: usize) -> Result<()> {
    check_bits(&Match::metadata(0, 0), offset, len, 0)
}

/// Check a bit range of the window.
pub fn check_packet_bits(
    offset: usize,
    len: usize,
    left_len: usize,
) -> Result<()> {
    check_bits(&Match::packet(0, 0), offset, len, left_len)
}
