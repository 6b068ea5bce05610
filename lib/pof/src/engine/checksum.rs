// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A generalized internet checksum.
//!
//! The CALCULATE_CHECKSUM action is not tied to any protocol. It sums
//! a bit range of the packet as a sequence of `width`-bit words, for
//! any width from 1 to 64, using one's complement arithmetic: every
//! carry out of the top bit is folded back into the bottom
//! ("end-around carry"). With `width = 16` over an IPv4 header this
//! is exactly the RFC 1071 checksum.
//!
//! # Words and byte order
//!
//! Words are read MSB-first from the bit stream, so a 16-bit word is
//! the big-endian interpretation of two consecutive bytes. The
//! finished sum is written back with the same convention, which means
//! no byte-order conversion ever happens on the checksum itself.
//!
//! # Why a complement sum
//!
//! The action accumulates the complement of each word rather than the
//! word itself. In one's complement arithmetic the sum of complements
//! is the complement of the sum, so the value written is the usual
//! "negated" checksum. Summing the range again, now including the
//! written checksum, yields all ones. That is what a receiver checks.
//!
//! The sum is carried in a `u128` so that a 64-bit word plus a 64-bit
//! running sum never overflows before the fold.

use super::bitfield::copy_bits;
use pof_api::PofError;

/// The largest word width the checksum supports.
pub const MAX_WIDTH: usize = 64;

/// A rolling one's complement sum of `width`-bit words.
#[derive(Clone, Copy, Debug)]
pub struct Checksum {
    sum: u128,
    width: u32,
}

impl Checksum {
    pub fn new(width: usize) -> Result<Self, PofError> {
        if width == 0 || width > MAX_WIDTH {
            return Err(PofError::BadLen(width as u16));
        }

        Ok(Self { sum: 0, width: width as u32 })
    }

    pub fn width(&self) -> usize {
        self.width as usize
    }

    fn threshold(&self) -> u128 {
        1u128 << self.width
    }

    fn mask(&self) -> u128 {
        self.threshold() - 1
    }

    fn fold(&mut self) {
        if self.sum >= self.threshold() {
            self.sum = self.sum - self.threshold() + 1;
        }
    }

    /// Add a word to the sum.
    pub fn add(&mut self, word: u64) {
        self.sum += (word as u128) & self.mask();
        self.fold();
    }

    /// Add the complement of a word to the sum.
    pub fn add_complement(&mut self, word: u64) {
        self.sum += !(word as u128) & self.mask();
        self.fold();
    }

    /// Add the complement of every whole word in the `len`-bit range
    /// at `start`. A trailing partial word is ignored.
    pub fn add_complement_bits(&mut self, buf: &[u8], start: usize, len: usize) {
        for word in Words::new(buf, start, len, self.width()) {
            self.add_complement(word);
        }
    }

    /// Add every whole word in the `len`-bit range at `start`.
    pub fn add_bits(&mut self, buf: &[u8], start: usize, len: usize) {
        for word in Words::new(buf, start, len, self.width()) {
            self.add(word);
        }
    }

    pub fn value(&self) -> u64 {
        self.sum as u64
    }

    /// The value of a fully-summed range that checks out.
    pub fn all_ones(&self) -> u64 {
        self.mask() as u64
    }
}

/// Iterate the `width`-bit words of a bit range, right-justified.
struct Words<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
    width: usize,
}

impl<'a> Words<'a> {
    fn new(buf: &'a [u8], start: usize, len: usize, width: usize) -> Self {
        Self { buf, pos: start, remaining: len / width, width }
    }
}

impl Iterator for Words<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }

        let mut tmp = [0u8; 8];
        copy_bits(self.buf, &mut tmp, self.pos, self.width);
        self.pos += self.width;
        self.remaining -= 1;
        Some(u64::from_be_bytes(tmp) >> (64 - self.width))
    }
}
