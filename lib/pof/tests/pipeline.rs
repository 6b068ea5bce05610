// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Whole-pipeline tests over realistic frames.

use pof::engine::checksum::Checksum;
use pof::engine::ctl::handle_cmd;
use pof_test_utils::*;

fn process(store: &ResourceStore, frame: &[u8], in_port: u32) -> pof::engine::ProcessOutcome {
    let mut pkt = PacketContext::new(frame, in_port).unwrap();
    Pipeline::default().process(store, &mut pkt)
}

#[test]
fn l2_forwarding_by_dmac() {
    let store = l2_switch(4);

    for n in 1..=4u32 {
        let frame = ipv4_frame(mac(n as u8), mac(9), [10, 0, 0, 1], [10, 0, 0, 2], 64, 32);
        let out = process(&store, &frame, 1);
        assert_eq!(out.result, ProcessResult::Forwarded { outputs: 1 });
        assert_eq!(out.outputs[0].port_id, n);
        assert_eq!(out.outputs[0].wire_bytes(), frame);
        assert_eq!(store.counter_get(n), Ok(1));
    }

    // Unknown destination: dropped under the default policy.
    let frame = ipv4_frame(mac(77), mac(9), [10, 0, 0, 1], [10, 0, 0, 2], 64, 32);
    let out = process(&store, &frame, 1);
    assert!(out.outputs.is_empty());
    assert!(out.packet_ins.is_empty());
}

#[test]
fn miss_goes_to_controller() {
    let store = l2_switch(2);
    let pl = Pipeline::new(PipelineCfg { miss_policy: pof::engine::MissPolicy::PacketIn });
    let frame = ipv4_frame(mac(77), mac(9), [10, 0, 0, 1], [10, 0, 0, 2], 64, 32);
    let mut pkt = PacketContext::new(&frame, 2).unwrap();
    let out = pl.process(&store, &mut pkt);

    assert_eq!(out.result, ProcessResult::PacketIn);
    assert_eq!(out.packet_ins.len(), 1);
    let pi = &out.packet_ins[0];
    assert_eq!(pi.reason, REASON_NO_MATCH);
    assert_eq!(pi.table_id, global_id(TableType::Em, 0));
    assert_eq!(pi.data, frame);
    assert_eq!(pi.buffer_id, NO_BUFFER);
}

// Decrement the TTL and recompute the IPv4 header checksum.
#[test]
fn route_decrements_ttl() {
    let mut store = store_with_ports(2);
    store
        .create_flow_table(table_desc(TableType::Mm, 0, "route", 4, vec![]))
        .unwrap();
    let ip_bits = (ETHER_HDR_LEN * 8) as u16;
    store
        .add_flow_entry(flow_entry(
            TableType::Mm,
            0,
            0,
            0,
            vec![],
            vec![apply(vec![
                Action::ModifyField {
                    field: Match::packet(IPV4_TTL_BITS, 8),
                    increment: -1,
                },
                Action::CalculateChecksum {
                    checksum_pos: ip_bits + 80,
                    checksum_len: 16,
                    cal_startpos: ip_bits,
                    cal_len: (IPV4_HDR_LEN * 8) as u16,
                },
                output(2),
            ])],
        ))
        .unwrap();

    let frame = ipv4_frame(mac(2), mac(1), [192, 168, 0, 1], [192, 168, 0, 199], 64, 95);
    let out = process(&store, &frame, 1);
    let sent = &out.outputs[0].packet;
    let ip = &sent[ETHER_HDR_LEN..ETHER_HDR_LEN + IPV4_HDR_LEN];
    assert_eq!(ip[8], 63);
    assert_ne!(ip[10..12], [0, 0]);

    let mut csum = Checksum::new(16).unwrap();
    csum.add_bits(ip, 0, IPV4_HDR_LEN * 8);
    assert_eq!(csum.value(), csum.all_ones());
}

// Push an 802.1Q tag on the way out of one table and pop it again in
// the next.
#[test]
fn vlan_push_and_pop() {
    let mut store = store_with_ports(2);
    store
        .create_flow_table(table_desc(TableType::Mm, 0, "push", 4, vec![]))
        .unwrap();
    store
        .create_flow_table(table_desc(
            TableType::Em,
            0,
            "tpid",
            4,
            vec![Match::packet(96, 16)],
        ))
        .unwrap();

    let push = Action::AddField {
        tag_id: 1,
        tag_pos: 96,
        tag_len: 32,
        tag_value: 0x8100_0064,
    };
    store
        .add_flow_entry(flow_entry(
            TableType::Mm,
            0,
            0,
            0,
            vec![],
            vec![apply(vec![push, output(1)]), goto(global_id(TableType::Em, 0), 0)],
        ))
        .unwrap();
    store
        .add_flow_entry(flow_entry(
            TableType::Em,
            0,
            0,
            0,
            vec![MatchX::new(Match::packet(96, 16), &[0x81, 0x00], &[0xff, 0xff])],
            vec![apply(vec![Action::DeleteField { tag_pos: 96, tag_len: 32 }, output(2)])],
        ))
        .unwrap();

    let frame = ipv4_frame(mac(1), mac(2), [10, 0, 0, 1], [10, 0, 0, 2], 64, 10);
    let out = process(&store, &frame, 1);
    assert_eq!(out.result, ProcessResult::Forwarded { outputs: 2 });

    let tagged = &out.outputs[0].packet;
    assert_eq!(tagged.len(), frame.len() + 4);
    assert_eq!(tagged[12..16], [0x81, 0x00, 0x00, 0x64]);
    assert_eq!(tagged[16..], frame[12..]);

    assert_eq!(out.outputs[1].packet, frame);
}

// Entries installed through the admin surface drive the pipeline the
// same way as entries installed directly.
#[test]
fn admin_commands_program_pipeline() {
    let shared = store_with_ports(2).shared();
    let send = |cmd, req: Vec<u8>| handle_cmd(&shared, CmdHeader::new(cmd, 1), &req);

    send(
        PofCmd::AddTable,
        postcard::to_allocvec(&AddTableReq {
            desc: table_desc(TableType::Linear, 0, "direct", 8, vec![]),
        })
        .unwrap(),
    )
    .unwrap();
    send(
        PofCmd::AddTable,
        postcard::to_allocvec(&AddTableReq {
            desc: table_desc(TableType::Mm, 0, "first", 8, vec![]),
        })
        .unwrap(),
    )
    .unwrap();

    let linear0 = global_id(TableType::Linear, 0);
    for entry in [
        flow_entry(
            TableType::Mm,
            0,
            0,
            0,
            vec![],
            vec![Instruction::GotoDirectTable {
                next_table_id: linear0,
                table_entry_index: 3,
                packet_offset: 0,
            }],
        ),
        flow_entry(TableType::Linear, 0, 3, 0, vec![], vec![apply(vec![output(2)])]),
    ] {
        send(PofCmd::AddEntry, postcard::to_allocvec(&EntryReq { entry }).unwrap())
            .unwrap();
    }

    let frame = eth_frame(mac(2), mac(1), 0x88b5, &[0u8; 46]);
    let out = process(&shared.read(), &frame, 1);
    assert_eq!(out.outputs.len(), 1);
    assert_eq!(out.outputs[0].port_id, 2);

    // A failed delete leaves the entry in place.
    let del = DelEntryReq { table_type: TableType::Linear, table_id: 0, index: 4 };
    assert_eq!(
        send(PofCmd::DelEntry, postcard::to_allocvec(&del).unwrap()),
        Err(PofError::EntryUnexist(4))
    );
    assert_eq!(process(&shared.read(), &frame, 1).outputs.len(), 1);

    let del = DelEntryReq { table_type: TableType::Linear, table_id: 0, index: 3 };
    send(PofCmd::DelEntry, postcard::to_allocvec(&del).unwrap()).unwrap();
    assert_eq!(
        process(&shared.read(), &frame, 1).error(),
        Some(&PofError::EntryUnexist(3))
    );
}

// A packet keeps running the entry it matched even if the slot is
// replaced underneath it.
#[test]
fn entry_snapshot_outlives_modify() {
    let mut store = l2_switch(2);
    let snapshot = store.entry(TableType::Em, 0, 1).unwrap().clone();

    let mut e = FlowEntry::clone(&snapshot);
    e.instructions = vec![apply(vec![Action::Drop { reason_code: 3 }])];
    store.modify_flow_entry(e).unwrap();

    assert_eq!(snapshot.instructions, vec![apply(vec![output(1)])]);
    let frame = ipv4_frame(mac(1), mac(2), [10, 0, 0, 1], [10, 0, 0, 2], 64, 10);
    let out = process(&store, &frame, 2);
    assert!(out.outputs.is_empty());
}
