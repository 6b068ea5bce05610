#![no_main]

use libfuzzer_sys::fuzz_target;
use pof::api::MAX_FIELD_LEN_BYTES;
use pof::engine::bitfield::copy_bits;
use pof::engine::bitfield::cover_bits;

// Writing a field and reading it back yields the same bits, and
// nothing outside the field changes.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 + MAX_FIELD_LEN_BYTES {
        return;
    }

    let (hdr, rest) = data.split_at(4);
    let (value, buf) = rest.split_at(MAX_FIELD_LEN_BYTES);
    let total_bits = buf.len() * 8;
    let len = usize::from(u16::from_be_bytes([hdr[0], hdr[1]]))
        % (MAX_FIELD_LEN_BYTES * 8 + 1);
    if total_bits < len {
        return;
    }
    let offset = usize::from(u16::from_be_bytes([hdr[2], hdr[3]]))
        % (total_bits - len + 1);

    let mut field = [0u8; MAX_FIELD_LEN_BYTES];
    copy_bits(value, &mut field, 0, len);

    let mut out = buf.to_vec();
    cover_bits(&mut out, &field, offset, len);

    let mut back = [0u8; MAX_FIELD_LEN_BYTES];
    copy_bits(&out, &mut back, offset, len);
    assert_eq!(back, field);

    for bit in (0..offset).chain(offset + len..total_bits) {
        let mask = 0x80 >> (bit % 8);
        assert_eq!(out[bit / 8] & mask, buf[bit / 8] & mask);
    }
});
