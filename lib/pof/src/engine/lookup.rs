// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Key extraction and flow entry matching.
//!
//! A table declares the fields that make up its key. [`build_key()`]
//! copies each of them out of the packet window or metadata, and
//! [`lookup()`] scans the table for the highest-priority entry whose
//! masked values agree with the key. All four table types share the
//! same linear scan; the type only matters to GOTO_DIRECT_TABLE.

use super::bitfield::copy_bits;
use super::flow_table::FlowTable;
use super::packet::PacketContext;
use pof_api::FlowEntry;
use pof_api::MAX_FIELD_LEN_BYTES;
use pof_api::MAX_MATCH_FIELD_NUM;
use pof_api::Match;
use pof_api::PofError;
use std::sync::Arc;

/// One extracted key field, left-justified and zero-padded.
pub type KeyField = [u8; MAX_FIELD_LEN_BYTES];

/// The fields extracted from a packet for one table lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Key {
    fields: heapless::Vec<KeyField, MAX_MATCH_FIELD_NUM>,
}

impl Key {
    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    /// Build a key directly from field values.
    pub fn from_fields(fields: &[&[u8]]) -> Result<Self, PofError> {
        let mut key = Self::default();
        for f in fields {
            let mut kf = [0u8; MAX_FIELD_LEN_BYTES];
            let n = f.len().min(MAX_FIELD_LEN_BYTES);
            kf[..n].copy_from_slice(&f[..n]);
            key.fields
                .push(kf)
                .map_err(|_| PofError::BadKeyLen(fields.len() as u16))?;
        }
        Ok(key)
    }
}

/// Reject a field no key can hold.
pub fn check_match_len(field: &Match) -> Result<(), PofError> {
    if field.len_bytes() > MAX_FIELD_LEN_BYTES {
        return Err(PofError::BadMatchLength(field.len_bits));
    }
    Ok(())
}

/// Extract the key for a table from a packet.
pub fn build_key(
    match_fields: &[Match],
    pkt: &PacketContext,
) -> Result<Key, PofError> {
    let mut key = Key::default();

    for field in match_fields {
        check_match_len(field)?;
        let buf = pkt.field_buf(field)?;
        let mut kf = [0u8; MAX_FIELD_LEN_BYTES];
        copy_bits(
            buf,
            &mut kf,
            field.offset_bits as usize,
            field.len_bits as usize,
        );
        key.fields
            .push(kf)
            .map_err(|_| PofError::BadKeyLen(match_fields.len() as u16))?;
    }

    Ok(key)
}

/// Does `entry` match `key`?
///
/// Each of the entry's match fields is compared with the key field at
/// the same position over the field's whole bytes. Key fields beyond
/// the entry's match list are wildcards.
pub fn entry_matches(entry: &FlowEntry, key: &Key) -> bool {
    entry.matches.iter().zip(key.fields()).all(|(mx, kf)| {
        let (value, mask) = mx.padded();
        let n = mx.field.len_bytes().min(MAX_FIELD_LEN_BYTES);
        (0..n).all(|i| kf[i] & mask[i] == value[i] & mask[i])
    })
}

/// Find the highest-priority entry matching `key`.
///
/// Slots are scanned in order and the winner is only displaced by a
/// strictly greater priority, so ties go to the lowest slot.
pub fn lookup<'a>(table: &'a FlowTable, key: &Key) -> Option<&'a Arc<FlowEntry>> {
    let mut best: Option<&Arc<FlowEntry>> = None;

    for entry in table.iter() {
        if !entry_matches(entry, key) {
            continue;
        }

        match best {
            Some(b) if entry.priority <= b.priority => {}
            _ => best = Some(entry),
        }
    }

    best
}

#[cfg(test)]
mod test {
    use super::*;
    use pof_api::FlowTableDesc;
    use pof_api::MatchX;
    use pof_api::TableType;
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table(size: u32) -> FlowTable {
        FlowTable::new(FlowTableDesc {
            table_type: TableType::Em,
            table_id: 0,
            name: "em0".into(),
            size,
            key_len: 32,
            match_fields: vec![Match::packet(0, 32)],
        })
    }

    fn entry(index: u32, priority: u16, value: [u8; 4], mask: [u8; 4]) -> FlowEntry {
        FlowEntry {
            table_type: TableType::Em,
            table_id: 0,
            index,
            priority,
            counter_id: 0,
            cookie: 0,
            cookie_mask: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            matches: vec![MatchX::new(Match::packet(0, 32), &value, &mask)],
            instructions: vec![],
        }
    }

    #[test]
    fn key_from_packet_and_metadata() {
        let frame = [0x11, 0x22, 0x33, 0x44, 0x55];
        let mut pkt = PacketContext::new(&frame, 9).unwrap();
        pkt.advance(1).unwrap();
        let key = build_key(
            &[Match::packet(4, 12), Match::metadata(16, 8)],
            &pkt,
        )
        .unwrap();
        assert_eq!(key.fields()[0][..2], [0x23, 0x30]);
        // Metadata byte 2 holds the ingress port.
        assert_eq!(key.fields()[1][0], 9);
    }

    #[test]
    fn key_field_out_of_window() {
        let pkt = PacketContext::new(&[0u8; 2], 0).unwrap();
        assert_eq!(
            build_key(&[Match::packet(8, 16)], &pkt),
            Err(PofError::PacketLenError)
        );
        assert_eq!(
            build_key(&[Match::packet(0, 168)], &pkt),
            Err(PofError::BadMatchLength(168))
        );
    }

    #[test]
    fn higher_priority_wins() {
        let mut t = table(8);
        t.insert(entry(0, 10, [10, 0, 0, 1], [0xff, 0, 0, 0])).unwrap();
        t.insert(entry(1, 20, [10, 0, 0, 1], [0xff, 0xff, 0xff, 0xff]))
            .unwrap();
        let key = Key::from_fields(&[&[10, 0, 0, 1]]).unwrap();
        assert_eq!(lookup(&t, &key).unwrap().index, 1);

        // Only the /8 entry matches a different host.
        let key = Key::from_fields(&[&[10, 9, 9, 9]]).unwrap();
        assert_eq!(lookup(&t, &key).unwrap().index, 0);

        let key = Key::from_fields(&[&[11, 0, 0, 1]]).unwrap();
        assert!(lookup(&t, &key).is_none());
    }

    #[test]
    fn ties_go_to_first_slot() {
        let mut t = table(8);
        t.insert(entry(5, 7, [1, 2, 3, 4], [0; 4])).unwrap();
        t.insert(entry(2, 7, [1, 2, 3, 4], [0; 4])).unwrap();
        t.insert(entry(6, 6, [1, 2, 3, 4], [0; 4])).unwrap();
        let key = Key::from_fields(&[&[9, 9, 9, 9]]).unwrap();
        assert_eq!(lookup(&t, &key).unwrap().index, 2);
    }

    // Against a brute-force oracle: the winner has the maximum
    // priority among matching entries and no earlier slot ties it.
    #[test]
    fn lookup_matches_oracle() {
        let mut rng = StdRng::seed_from_u64(0x10_0c);

        for _ in 0..200 {
            let mut t = table(32);
            for idx in 0..32 {
                if rng.random_bool(0.6) {
                    let value: [u8; 4] = rng.random();
                    let mask = [rng.random::<u8>() & 0xf0, 0, 0, 0];
                    let prio = rng.random_range(0..4);
                    t.insert(entry(idx, prio, value, mask)).unwrap();
                }
            }

            let kv: [u8; 4] = rng.random();
            let key = Key::from_fields(&[&kv]).unwrap();
            let got = lookup(&t, &key).map(|e| e.index);

            let matching: Vec<_> =
                t.iter().filter(|e| entry_matches(e, &key)).collect();
            let want = matching
                .iter()
                .map(|e| e.priority)
                .max()
                .and_then(|p| matching.iter().find(|e| e.priority == p))
                .map(|e| e.index);
            assert_eq!(got, want);
            // Repeatable.
            assert_eq!(lookup(&t, &key).map(|e| e.index), got);
        }
    }
}
