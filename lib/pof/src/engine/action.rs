// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The action executor.
//!
//! Actions run in list order until the list is exhausted or one of
//! them marks the packet done. The first failure aborts the rest of
//! the list; whatever earlier actions did to the packet stays done.
//!
//! Outputs and upcalls are not sent from here. They are collected in
//! [`Effects`] and handed off by whoever drives the pipeline.

use super::bitfield::bits_to_bytes;
use super::bitfield::check_u32_len;
use super::bitfield::copy_bits;
use super::bitfield::cover_bits;
use super::bitfield::read_u32_field;
use super::bitfield::shift_tail_left;
use super::bitfield::shift_tail_right;
use super::bitfield::write_u32_field;
use super::bitfield::write_u64_field;
use super::bitfield::zero_bits;
use super::checksum::Checksum;
use super::lookup::check_match_len;
use super::packet::PacketContext;
use super::packet::check_metadata_bits;
use super::packet::check_packet_bits;
use super::resource::ResourceStore;
use pof_api::Action;
use pof_api::FIRST_TABLE_ID;
use pof_api::MAX_FIELD_LEN_BYTES;
use pof_api::MAX_GROUP_DEPTH;
use pof_api::METADATA_MAX_LEN;
use pof_api::Match;
use pof_api::MatchX;
use pof_api::NO_BUFFER;
use pof_api::PACKET_IN_MAX_LEN;
use pof_api::PACKET_RAW_MAX_LEN;
use pof_api::PacketIn;
use pof_api::PofError;
use pof_api::REASON_ACTION;

type Result<T> = core::result::Result<T, PofError>;

/// The largest tag ADD_FIELD can insert, in bits.
pub const MAX_TAG_LEN: usize = 64;

/// A frame assembled by OUTPUT, waiting for the send stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputRecord {
    pub port_id: u32,
    pub metadata: Vec<u8>,
    pub packet: Vec<u8>,
}

impl OutputRecord {
    /// The bytes that go on the wire: metadata, then packet.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.metadata);
        buf.extend_from_slice(&self.packet);
        buf
    }

    pub fn len(&self) -> usize {
        self.metadata.len() + self.packet.len()
    }
}

/// Everything the actions of one packet emitted.
#[derive(Debug, Default)]
pub struct Effects {
    pub outputs: Vec<OutputRecord>,
    pub packet_ins: Vec<PacketIn>,
    /// Set by DROP.
    pub drop_reason: Option<u32>,
}

/// Run an action list against a packet.
pub fn execute<'a>(
    store: &'a ResourceStore,
    pkt: &mut PacketContext,
    actions: &'a [Action],
    fx: &mut Effects,
) -> Result<()> {
    let mut list = actions;
    let mut i = 0;
    let mut depth = 0;

    while !pkt.done() && i < list.len() {
        let act = &list[i];

        // A group replaces the list being run. Whatever followed the
        // GROUP action in the outer list is never reached.
        if let Action::Group { group_id } = act {
            depth += 1;
            if depth > MAX_GROUP_DEPTH {
                let err = PofError::GroupLoopDetected(*group_id);
                action_error_probe(act, &err);
                return Err(err);
            }

            let res = store.group(*group_id).and_then(|g| {
                store.counter_increment(g.counter_id)?;
                Ok(g)
            });
            match res {
                Ok(group) => {
                    list = &group.actions;
                    i = 0;
                    continue;
                }
                Err(err) => {
                    action_error_probe(act, &err);
                    return Err(err);
                }
            }
        }

        if let Err(err) = execute_one(store, pkt, act, fx) {
            action_error_probe(act, &err);
            return Err(err);
        }
        i += 1;
    }

    Ok(())
}

fn execute_one(
    store: &ResourceStore,
    pkt: &mut PacketContext,
    act: &Action,
    fx: &mut Effects,
) -> Result<()> {
    match act {
        Action::Output {
            port_id,
            metadata_offset,
            metadata_len,
            packet_offset,
        } => {
            let rec = output(
                store,
                pkt,
                *port_id,
                *metadata_offset as usize,
                *metadata_len as usize,
                *packet_offset as usize,
            )?;
            fx.outputs.push(rec);
            Ok(())
        }

        Action::Drop { reason_code } => {
            fx.drop_reason = Some(*reason_code);
            pkt.set_done();
            Ok(())
        }

        Action::PacketIn { reason_code } => {
            // The reason travels in a single byte.
            let reason = u8::try_from(*reason_code).unwrap_or(REASON_ACTION);
            let pi = packet_in(store, pkt, reason)?;
            fx.packet_ins.push(pi);
            Ok(())
        }

        Action::SetField(mx) => set_field(pkt, mx),

        Action::SetFieldFromMetadata { field, metadata_offset } => {
            set_field_from_metadata(pkt, field, *metadata_offset as usize)
        }

        Action::ModifyField { field, increment } => {
            modify_field(pkt, field, *increment)
        }

        Action::AddField { tag_pos, tag_len, tag_value, .. } => {
            add_field(pkt, *tag_pos as usize, *tag_len as usize, *tag_value)
        }

        Action::DeleteField { tag_pos, tag_len } => {
            delete_field(pkt, *tag_pos as usize, *tag_len as usize)
        }

        Action::CalculateChecksum {
            checksum_pos,
            checksum_len,
            cal_startpos,
            cal_len,
        } => calculate_checksum(
            pkt,
            *checksum_pos as usize,
            *checksum_len as usize,
            *cal_startpos as usize,
            *cal_len as usize,
        ),

        Action::Counter { counter_id } => store.counter_increment(*counter_id),

        // Handled by `execute()`.
        Action::Group { group_id } => Err(PofError::UnknownGroup(*group_id)),

        Action::Experimenter => Err(PofError::BadActionType),
    }
}

/// Assemble an output frame: `metadata_len` bits of metadata from
/// `metadata_offset`, rounded up to whole bytes, followed by the frame
/// from the absolute byte `packet_offset` to the end of the window.
pub fn output(
    store: &ResourceStore,
    pkt: &PacketContext,
    port_id: u32,
    metadata_offset: usize,
    metadata_len: usize,
    packet_offset: usize,
) -> Result<OutputRecord> {
    let end = pkt.end();
    if packet_offset > end {
        return Err(PofError::PacketLenError);
    }

    if bits_to_bytes(metadata_len + metadata_offset) > METADATA_MAX_LEN {
        return Err(PofError::MetadataLenError);
    }

    let port = store.check_port_index(port_id)?;

    let md_bytes = bits_to_bytes(metadata_len);
    let packet_len = end - packet_offset;
    if md_bytes + packet_len > port.mtu {
        return Err(PofError::PacketLenError);
    }

    let mut metadata = vec![0u8; md_bytes];
    copy_bits(pkt.metadata(), &mut metadata, metadata_offset, md_bytes * 8);

    Ok(OutputRecord {
        port_id,
        metadata,
        packet: pkt.raw_range(packet_offset, end).to_vec(),
    })
}

/// Build an upcall carrying the frame up to the end of the window.
pub fn packet_in(
    store: &ResourceStore,
    pkt: &PacketContext,
    reason: u8,
) -> Result<PacketIn> {
    let data = pkt.frame();
    if data.len() > PACKET_IN_MAX_LEN {
        return Err(PofError::PacketLenError);
    }

    let table_id = match pkt.table() {
        Some((tt, id)) => store.table_id_to_global(tt, id)?,
        None => FIRST_TABLE_ID,
    };
    let cookie = pkt.entry().map(|e| e.masked_cookie()).unwrap_or(0);

    Ok(PacketIn {
        buffer_id: NO_BUFFER,
        // Bounded by PACKET_IN_MAX_LEN above.
        total_len: data.len() as u16,
        reason,
        table_id,
        cookie,
        device_id: store.cfg().device_id,
        data: data.to_vec(),
    })
}

fn set_field(pkt: &mut PacketContext, mx: &MatchX) -> Result<()> {
    let off = mx.field.offset_bits as usize;
    let len = mx.field.len_bits as usize;
    check_match_len(&mx.field)?;
    check_packet_bits(off, len, pkt.left_len())?;

    let (mut value, mask) = mx.padded();
    for (v, m) in value.iter_mut().zip(mask.iter()) {
        *v &= m;
    }

    cover_bits(pkt.window_mut(), &value, off, len);
    Ok(())
}

fn set_field_from_metadata(
    pkt: &mut PacketContext,
    field: &Match,
    metadata_offset: usize,
) -> Result<()> {
    let off = field.offset_bits as usize;
    let len = field.len_bits as usize;
    check_match_len(field)?;
    check_packet_bits(off, len, pkt.left_len())?;
    check_metadata_bits(metadata_offset, len)?;

    let mut value = [0u8; MAX_FIELD_LEN_BYTES];
    copy_bits(pkt.metadata(), &mut value, metadata_offset, len);
    cover_bits(pkt.window_mut(), &value, off, len);
    Ok(())
}

fn modify_field(
    pkt: &mut PacketContext,
    field: &Match,
    increment: i32,
) -> Result<()> {
    let off = field.offset_bits as usize;
    let len = field.len_bits as usize;
    // Width before bounds.
    check_u32_len(len)?;

    let value = read_u32_field(pkt.field_buf(field)?, off, len)?;
    let value = value.wrapping_add(increment as u32);
    write_u32_field(pkt.field_buf_mut(field)?, value, off, len)
}

/// Insert `tag_len` bits of `tag_value` at `tag_pos`. The window grows
/// by whole bytes, so a tag that is not a multiple of 8 bits leaves
/// zero padding at the end of the frame.
fn add_field(
    pkt: &mut PacketContext,
    tag_pos: usize,
    tag_len: usize,
    tag_value: u64,
) -> Result<()> {
    let grow = bits_to_bytes(tag_len);
    let left_bits = pkt.left_len() * 8;
    if pkt.end() + grow > PACKET_RAW_MAX_LEN || tag_pos > left_bits {
        return Err(PofError::PacketLenError);
    }

    if tag_len > MAX_TAG_LEN {
        return Err(PofError::BadTag(tag_len as u16));
    }

    let behind = left_bits - tag_pos;
    let buf = pkt.tail_mut();
    shift_tail_right(buf, tag_pos, tag_len, behind);
    write_u64_field(buf, tag_value, tag_pos, tag_len);
    pkt.grow(grow);
    Ok(())
}

fn delete_field(
    pkt: &mut PacketContext,
    tag_pos: usize,
    tag_len: usize,
) -> Result<()> {
    let left_bits = pkt.left_len() * 8;
    if tag_pos + tag_len > left_bits {
        return Err(PofError::PacketLenError);
    }

    let behind = left_bits - (tag_pos + tag_len);
    shift_tail_left(pkt.window_mut(), tag_pos, tag_len, behind);

    let left_len = bits_to_bytes(left_bits - tag_len);
    pkt.shrink_to(left_len);

    // Clear the stale bits the shift left behind in the final byte.
    let rem = tag_len % 8;
    if rem != 0 {
        if let Some(last) = pkt.window_mut().last_mut() {
            *last &= 0xff << rem;
        }
    }

    Ok(())
}

fn calculate_checksum(
    pkt: &mut PacketContext,
    checksum_pos: usize,
    checksum_len: usize,
    cal_startpos: usize,
    cal_len: usize,
) -> Result<()> {
    let mut csum = Checksum::new(checksum_len)?;
    check_packet_bits(checksum_pos, checksum_len, pkt.left_len())?;
    check_packet_bits(cal_startpos, cal_len, pkt.left_len())?;

    let buf = pkt.window_mut();
    zero_bits(buf, checksum_pos, checksum_len);
    csum.add_complement_bits(buf, cal_startpos, cal_len);
    write_u64_field(buf, csum.value(), checksum_pos, checksum_len);
    Ok(())
}

fn action_error_probe(act: &Action, err: &PofError) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            let err_s = err.to_string();
            crate::pof_provider::action__error!(
                || (act.name(), err_s.as_str())
            );
        } else {
            let (_, _) = (act, err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pof_api::FlowTableDesc;
    use pof_api::Group;
    use pof_api::PortDesc;
    use pof_api::TableType;
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn store() -> ResourceStore {
        let mut rs = ResourceStore::new(Default::default());
        for id in 1..=2 {
            let mut p = PortDesc::new(id, &format!("p{id}"), [2, 0, 0, 0, 0, id as u8]);
            p.of_enable = true;
            rs.add_port(p).unwrap();
        }
        rs
    }

    fn pkt(len: usize) -> PacketContext {
        let frame: Vec<u8> = (0..len).map(|i| i as u8).collect();
        PacketContext::new(&frame, 1).unwrap()
    }

    fn run(rs: &ResourceStore, p: &mut PacketContext, acts: &[Action]) -> Result<Effects> {
        let mut fx = Effects::default();
        execute(rs, p, acts, &mut fx)?;
        Ok(fx)
    }

    fn out(port_id: u32, md_off: u16, md_len: u16, pkt_off: u16) -> Action {
        Action::Output {
            port_id,
            metadata_offset: md_off,
            metadata_len: md_len,
            packet_offset: pkt_off,
        }
    }

    #[test]
    fn output_whole_packet_and_metadata() {
        let rs = store();
        let mut p = pkt(64);
        p.advance(14).unwrap();

        let fx = run(&rs, &mut p, &[out(2, 0, 0, 0), out(1, 0, 24, 14)]).unwrap();
        assert_eq!(fx.outputs.len(), 2);
        assert!(!p.done());
        assert_eq!(fx.outputs[0].port_id, 2);
        assert_eq!(fx.outputs[0].packet, pkt(64).frame());
        assert!(fx.outputs[0].metadata.is_empty());

        // {len = 64, port = 1, reserve}
        assert_eq!(fx.outputs[1].metadata, vec![0, 64, 1]);
        assert_eq!(fx.outputs[1].packet.len(), 50);
        assert_eq!(fx.outputs[1].wire_bytes().len(), 53);
    }

    #[test]
    fn output_errors() {
        let rs = store();
        let mut p = pkt(20);
        assert_eq!(run(&rs, &mut p, &[out(9, 0, 0, 0)]).err(), Some(PofError::BadPortId(9)));
        assert_eq!(run(&rs, &mut p, &[out(1, 0, 0, 21)]).err(), Some(PofError::PacketLenError));
        assert_eq!(
            run(&rs, &mut p, &[out(1, 1020, 5, 0)]).err(),
            Some(PofError::MetadataLenError)
        );

        let mut big = pkt(1515);
        assert_eq!(run(&rs, &mut big, &[out(1, 0, 0, 0)]).err(), Some(PofError::PacketLenError));
        assert_eq!(run(&rs, &mut big, &[out(1, 0, 0, 1)]).map(|fx| fx.outputs.len()), Ok(1));
    }

    #[test]
    fn drop_stops_the_list() {
        let rs = store();
        let mut p = pkt(20);
        let fx = run(
            &rs,
            &mut p,
            &[Action::Drop { reason_code: 7 }, out(1, 0, 0, 0)],
        )
        .unwrap();
        assert!(p.done());
        assert_eq!(fx.drop_reason, Some(7));
        assert!(fx.outputs.is_empty());
    }

    #[test]
    fn set_field_masked() {
        let rs = store();
        let mut p = pkt(8);
        let mx = MatchX::new(Match::packet(12, 8), &[0xab], &[0xf0]);
        run(&rs, &mut p, &[Action::SetField(mx)]).unwrap();
        // Bits 12..20 become 0xa0; bits outside are untouched.
        assert_eq!(p.window()[..3], [0x00, 0x0a, 0x02]);

        let mx = MatchX::new(Match::packet(60, 8), &[0xff], &[0xff]);
        assert_eq!(
            run(&rs, &mut p, &[Action::SetField(mx)]).err(),
            Some(PofError::PacketLenError)
        );
    }

    #[test]
    fn set_field_from_metadata_copies_port() {
        let rs = store();
        let mut p = pkt(8);
        let act = Action::SetFieldFromMetadata {
            field: Match::packet(8, 8),
            metadata_offset: 16,
        };
        run(&rs, &mut p, &[act]).unwrap();
        assert_eq!(p.window()[1], 1);

        let act = Action::SetFieldFromMetadata {
            field: Match::packet(0, 16),
            metadata_offset: 1020,
        };
        assert_eq!(run(&rs, &mut p, &[act]).err(), Some(PofError::MetadataLenError));
    }

    #[test]
    fn modify_field_wraps() {
        let rs = store();
        let mut p = PacketContext::new(&[0x00, 0xff, 0x10], 1).unwrap();
        let dec_ttl = Action::ModifyField { field: Match::packet(16, 8), increment: -1 };
        run(&rs, &mut p, &[dec_ttl.clone(), dec_ttl]).unwrap();
        assert_eq!(p.window()[2], 0x0e);

        let inc = Action::ModifyField { field: Match::packet(8, 8), increment: 1 };
        run(&rs, &mut p, &[inc]).unwrap();
        // Only the low 8 bits are written back.
        assert_eq!(p.window()[..2], [0x00, 0x00]);

        let md = Action::ModifyField { field: Match::metadata(32, 16), increment: 300 };
        run(&rs, &mut p, &[md]).unwrap();
        assert_eq!(p.metadata()[4..6], 300u16.to_be_bytes());

        let wide = Action::ModifyField { field: Match::metadata(0, 33), increment: 1 };
        assert_eq!(run(&rs, &mut p, &[wide]).err(), Some(PofError::BadLen(33)));

        // Too wide and past the end of a 3-byte window: width wins.
        let wide = Action::ModifyField { field: Match::packet(0, 40), increment: 1 };
        assert_eq!(run(&rs, &mut p, &[wide]).err(), Some(PofError::BadLen(40)));
    }

    #[test]
    fn add_field_inserts_tag() {
        let rs = store();
        let mut p = PacketContext::new(&[0xaa, 0xbb, 0xcc, 0xdd], 1).unwrap();
        let add = Action::AddField { tag_id: 1, tag_pos: 16, tag_len: 16, tag_value: 0x8100 };
        run(&rs, &mut p, &[add]).unwrap();
        assert_eq!(p.window(), &[0xaa, 0xbb, 0x81, 0x00, 0xcc, 0xdd]);
        assert_eq!(p.metadata_len(), 6);

        let add = Action::AddField { tag_id: 1, tag_pos: 4, tag_len: 4, tag_value: 0x5 };
        run(&rs, &mut p, &[add]).unwrap();
        assert_eq!(p.window(), &[0xa5, 0xab, 0xb8, 0x10, 0x0c, 0xcd, 0xd0]);

        let big = Action::AddField { tag_id: 1, tag_pos: 0, tag_len: 65, tag_value: 0 };
        assert_eq!(run(&rs, &mut p, &[big]).err(), Some(PofError::BadTag(65)));
        let past = Action::AddField { tag_id: 1, tag_pos: 57, tag_len: 8, tag_value: 0 };
        assert_eq!(run(&rs, &mut p, &[past]).err(), Some(PofError::PacketLenError));
    }

    #[test]
    fn add_field_respects_raw_capacity() {
        let rs = store();
        let mut p = pkt(PACKET_RAW_MAX_LEN - 1);
        let add = Action::AddField { tag_id: 1, tag_pos: 0, tag_len: 16, tag_value: 0 };
        assert_eq!(run(&rs, &mut p, &[add]).err(), Some(PofError::PacketLenError));
    }

    #[test]
    fn delete_field_removes_tag() {
        let rs = store();
        let mut p = PacketContext::new(&[0xaa, 0xbb, 0x81, 0x00, 0xcc, 0xdd], 1).unwrap();
        let del = Action::DeleteField { tag_pos: 16, tag_len: 16 };
        run(&rs, &mut p, &[del]).unwrap();
        assert_eq!(p.window(), &[0xaa, 0xbb, 0xcc, 0xdd]);
        assert_eq!(p.metadata_len(), 4);

        let del = Action::DeleteField { tag_pos: 4, tag_len: 4 };
        run(&rs, &mut p, &[del]).unwrap();
        assert_eq!(p.window(), &[0xab, 0xbc, 0xcd, 0xd0]);

        let del = Action::DeleteField { tag_pos: 24, tag_len: 9 };
        assert_eq!(run(&rs, &mut p, &[del]).err(), Some(PofError::PacketLenError));
    }

    // ADD_FIELD then DELETE_FIELD at the same place restores the
    // window. Whole-byte tags restore the length too; sub-byte tags
    // leave the length rounded up by one byte of zero padding.
    #[test]
    fn add_delete_inverse() {
        let rs = store();
        let mut rng = StdRng::seed_from_u64(0xadd);

        for _ in 0..500 {
            let len = rng.random_range(1..64);
            let frame: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let mut p = PacketContext::new(&frame, 1).unwrap();
            let pos = rng.random_range(0..=len * 8) as u16;
            let tag_len = rng.random_range(1..=64u16);
            let acts = [
                Action::AddField { tag_id: 0, tag_pos: pos, tag_len, tag_value: rng.random() },
                Action::DeleteField { tag_pos: pos, tag_len },
            ];
            run(&rs, &mut p, &acts).unwrap();

            assert_eq!(&p.window()[..len], &frame[..]);
            if tag_len % 8 == 0 {
                assert_eq!(p.left_len(), len);
            } else {
                assert_eq!(p.left_len(), len + 1);
                assert_eq!(p.window()[len], 0);
            }
        }
    }

    #[test]
    fn checksum_over_ipv4_header() {
        let rs = store();
        let hdr = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x12, 0x34,
            0xc0, 0xa8, 0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let mut p = PacketContext::new(&hdr, 1).unwrap();
        let act = Action::CalculateChecksum {
            checksum_pos: 80,
            checksum_len: 16,
            cal_startpos: 0,
            cal_len: 160,
        };
        run(&rs, &mut p, &[act]).unwrap();
        assert_eq!(p.window()[10..12], [0xb8, 0x61]);

        let mut verify = Checksum::new(16).unwrap();
        verify.add_bits(p.window(), 0, 160);
        assert_eq!(verify.value(), verify.all_ones());

        let bad = Action::CalculateChecksum {
            checksum_pos: 0,
            checksum_len: 65,
            cal_startpos: 0,
            cal_len: 160,
        };
        assert_eq!(run(&rs, &mut p, &[bad]).err(), Some(PofError::BadLen(65)));
    }

    #[test]
    fn checksum_odd_widths_verify() {
        let rs = store();
        let mut rng = StdRng::seed_from_u64(0xc5);

        for _ in 0..200 {
            let width = rng.random_range(1..=64usize);
            let words = rng.random_range(2..8usize);
            let bytes = bits_to_bytes(width * words);
            let frame: Vec<u8> = (0..bytes).map(|_| rng.random()).collect();
            let mut p = PacketContext::new(&frame, 1).unwrap();
            let slot = rng.random_range(0..words);
            let act = Action::CalculateChecksum {
                checksum_pos: (slot * width) as u16,
                checksum_len: width as u16,
                cal_startpos: 0,
                cal_len: (width * words) as u16,
            };
            run(&rs, &mut p, &[act]).unwrap();

            let mut verify = Checksum::new(width).unwrap();
            verify.add_bits(p.window(), 0, width * words);
            // All ones, or its one's complement twin, zero.
            let v = verify.value();
            assert!(v == verify.all_ones() || v == 0, "width {width}");
        }
    }

    #[test]
    fn counter_and_group() {
        let mut rs = store();
        rs.add_group(Group {
            group_id: 3,
            counter_id: 6,
            actions: vec![Action::Counter { counter_id: 5 }, out(1, 0, 0, 0)],
        })
        .unwrap();

        let mut p = pkt(20);
        let fx = run(
            &rs,
            &mut p,
            &[Action::Group { group_id: 3 }, out(2, 0, 0, 0)],
        )
        .unwrap();
        assert_eq!(rs.counter_get(5), Ok(1));
        assert_eq!(rs.counter_get(6), Ok(1));
        // The OUTPUT after GROUP in the outer list never runs.
        assert_eq!(fx.outputs.len(), 1);
        assert_eq!(fx.outputs[0].port_id, 1);

        assert_eq!(
            run(&rs, &mut p, &[Action::Group { group_id: 9 }]).err(),
            Some(PofError::UnknownGroup(9))
        );
    }

    #[test]
    fn group_loop_detected() {
        let mut rs = store();
        rs.add_group(Group {
            group_id: 1,
            counter_id: 0,
            actions: vec![Action::Group { group_id: 1 }],
        })
        .unwrap();

        let mut p = pkt(20);
        assert_eq!(
            run(&rs, &mut p, &[Action::Group { group_id: 1 }]).err(),
            Some(PofError::GroupLoopDetected(1))
        );
    }

    #[test]
    fn packet_in_reports_entry_cookie() {
        let mut rs = store();
        rs.create_flow_table(FlowTableDesc {
            table_type: TableType::Em,
            table_id: 1,
            name: "em1".into(),
            size: 4,
            key_len: 0,
            match_fields: vec![],
        })
        .unwrap();
        let mut p = pkt(30);
        p.advance(10).unwrap();
        p.set_table(TableType::Em, 1);

        let fx = run(&rs, &mut p, &[Action::PacketIn { reason_code: 1 }]).unwrap();
        assert!(!p.done());
        let pi = &fx.packet_ins[0];
        assert_eq!(pi.table_id, 6 + 3 + 1);
        assert_eq!(pi.total_len, 30);
        assert_eq!(pi.data, pkt(30).frame());
        assert_eq!(pi.buffer_id, NO_BUFFER);
        assert_eq!(pi.cookie, 0);
    }

    #[test]
    fn experimenter_rejected() {
        let rs = store();
        let mut p = pkt(20);
        assert_eq!(
            run(&rs, &mut p, &[Action::Experimenter]).err(),
            Some(PofError::BadActionType)
        );
    }
}
