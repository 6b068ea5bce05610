// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Bit-precise field access.
//!
//! Every field the pipeline touches is described as a bit offset and
//! a bit length into a byte buffer. Bit 0 is the most significant bit
//! of byte 0, which is the order bits appear on the wire. A field that
//! has been extracted is always left-justified: its first bit lands in
//! the MSB of the first output byte, and unused bits of the final
//! byte are zero.
//!
//! None of these functions validate their ranges. Indexing past the
//! end of a buffer panics, so every caller checks the field against
//! the packet window or metadata length first and reports
//! `PacketLenError`/`MetadataLenError` itself.

use pof_api::PACKET_RAW_MAX_LEN;
use pof_api::PofError;

#[inline]
pub fn bits_to_bytes(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Copy the `len` bits at `offset` in `src` into `dst`,
/// left-justified.
pub fn copy_bits(src: &[u8], dst: &mut [u8], offset: usize, len: usize) {
    if len == 0 {
        return;
    }

    let start = offset / 8;
    let sh = offset % 8;
    let nbytes = bits_to_bytes(len);

    for (i, d) in dst[..nbytes].iter_mut().enumerate() {
        let hi = src[start + i];
        *d = if sh == 0 {
            hi
        } else {
            // The low half may sit past the end of the field, and
            // therefore past the end of `src`.
            let lo = src.get(start + i + 1).copied().unwrap_or(0);
            (hi << sh) | (lo >> (8 - sh))
        };
    }

    let rem = len % 8;
    if rem != 0 {
        dst[nbytes - 1] &= 0xff << (8 - rem);
    }
}

/// Write the top `n` bits of `v` at bit `pos` of `dst`, where
/// `1 <= n <= 8`.
#[inline]
fn put_bits(dst: &mut [u8], pos: usize, v: u8, n: usize) {
    let idx = pos / 8;
    let sh = pos % 8;
    let mask = (0xffffu16 << (16 - n)) >> sh;
    let bits = (((v as u16) << 8) >> sh) & mask;
    let [mhi, mlo] = mask.to_be_bytes();
    let [bhi, blo] = bits.to_be_bytes();

    dst[idx] = (dst[idx] & !mhi) | bhi;
    if mlo != 0 {
        dst[idx + 1] = (dst[idx + 1] & !mlo) | blo;
    }
}

/// Overwrite the `len`-bit field at `offset` in `dst` with the
/// left-justified bits of `value`. Bits outside the field are
/// preserved.
pub fn cover_bits(dst: &mut [u8], value: &[u8], offset: usize, len: usize) {
    for k in 0..bits_to_bytes(len) {
        let n = (len - k * 8).min(8);
        put_bits(dst, offset + k * 8, value[k], n);
    }
}

/// Clear the `len`-bit field at `offset`.
pub fn zero_bits(dst: &mut [u8], offset: usize, len: usize) {
    for k in 0..bits_to_bytes(len) {
        let n = (len - k * 8).min(8);
        put_bits(dst, offset + k * 8, 0, n);
    }
}

/// `BadLen` unless the field fits the 32-bit helpers.
pub fn check_u32_len(len: usize) -> Result<(), PofError> {
    if len > 32 {
        return Err(PofError::BadLen(u16::try_from(len).unwrap_or(u16::MAX)));
    }
    Ok(())
}

/// Read a field of at most 32 bits, right-justified.
pub fn read_u32_field(
    buf: &[u8],
    offset: usize,
    len: usize,
) -> Result<u32, PofError> {
    check_u32_len(len)?;
    if len == 0 {
        return Ok(0);
    }

    let mut tmp = [0u8; 4];
    copy_bits(buf, &mut tmp, offset, len);
    Ok(u32::from_be_bytes(tmp) >> (32 - len))
}

/// Store the low `len` bits of `value` into the field at `offset`.
pub fn write_u32_field(
    buf: &mut [u8],
    value: u32,
    offset: usize,
    len: usize,
) -> Result<(), PofError> {
    check_u32_len(len)?;
    if len == 0 {
        return Ok(());
    }

    let bytes = (value << (32 - len)).to_be_bytes();
    cover_bits(buf, &bytes, offset, len);
    Ok(())
}

/// Store the low `len` bits of `value`, for fields of up to 64 bits.
/// The caller has already bounded `len`.
pub fn write_u64_field(buf: &mut [u8], value: u64, offset: usize, len: usize) {
    if len == 0 {
        return;
    }

    let bytes = (value << (64 - len)).to_be_bytes();
    cover_bits(buf, &bytes, offset, len);
}

/// Move the `tail_len` bits at `pos` right by `shift` bits. The
/// `shift` bits opened up at `pos` keep their old contents.
pub fn shift_tail_right(
    buf: &mut [u8],
    pos: usize,
    shift: usize,
    tail_len: usize,
) {
    let mut tmp = [0u8; PACKET_RAW_MAX_LEN];
    copy_bits(buf, &mut tmp, pos, tail_len);
    cover_bits(buf, &tmp, pos + shift, tail_len);
}

/// Move the `tail_len` bits at `pos + shift` left onto `pos`,
/// overwriting the `shift` bits in between. The old copy of the last
/// `shift` bits is left behind.
pub fn shift_tail_left(
    buf: &mut [u8],
    pos: usize,
    shift: usize,
    tail_len: usize,
) {
    let mut tmp = [0u8; PACKET_RAW_MAX_LEN];
    copy_bits(buf, &mut tmp, pos + shift, tail_len);
    cover_bits(buf, &tmp, pos, tail_len);
}
