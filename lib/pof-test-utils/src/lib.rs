// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Common fixtures for the integration tests, benches and the switch
//! binary's tests: frames, resource descriptions and a small L2
//! pipeline.

pub mod pcap;

pub use pof::api::*;
pub use pof::engine::OutputRecord;
pub use pof::engine::PacketContext;
pub use pof::engine::Pipeline;
pub use pof::engine::PipelineCfg;
pub use pof::engine::ProcessResult;
pub use pof::engine::ResourceStore;
pub use pof::engine::StoreCfg;

pub const ETHER_HDR_LEN: usize = 14;
pub const IPV4_HDR_LEN: usize = 20;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Bit offset of the IPv4 TTL within an Ethernet frame.
pub const IPV4_TTL_BITS: u16 = ((ETHER_HDR_LEN + 8) * 8) as u16;

/// A locally administered unicast MAC ending in `n`.
pub fn mac(n: u8) -> [u8; 6] {
    [0x02, 0, 0, 0, 0, n]
}

/// An Ethernet frame carrying `payload`.
pub fn eth_frame(
    dst: [u8; 6],
    src: [u8; 6],
    ethertype: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut f = Vec::with_capacity(ETHER_HDR_LEN + payload.len());
    f.extend_from_slice(&dst);
    f.extend_from_slice(&src);
    f.extend_from_slice(&ethertype.to_be_bytes());
    f.extend_from_slice(payload);
    f
}

/// An Ethernet/IPv4 frame with a zeroed header checksum, padded with
/// `payload_len` bytes of payload.
pub fn ipv4_frame(
    dst: [u8; 6],
    src: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    ttl: u8,
    payload_len: usize,
) -> Vec<u8> {
    let total_len = (IPV4_HDR_LEN + payload_len) as u16;
    let mut ip = vec![0u8; IPV4_HDR_LEN + payload_len];
    ip[0] = 0x45;
    ip[2..4].copy_from_slice(&total_len.to_be_bytes());
    ip[6] = 0x40;
    ip[8] = ttl;
    ip[9] = 17;
    ip[12..16].copy_from_slice(&src_ip);
    ip[16..20].copy_from_slice(&dst_ip);
    for (i, b) in ip[IPV4_HDR_LEN..].iter_mut().enumerate() {
        *b = i as u8;
    }
    eth_frame(dst, src, ETHERTYPE_IPV4, &ip)
}

/// An enabled port with MAC `mac(id)`.
pub fn port(id: u32) -> PortDesc {
    let mut p = PortDesc::new(id, &format!("port{id}"), mac(id as u8));
    p.of_enable = true;
    p
}

pub fn table_desc(
    table_type: TableType,
    table_id: u8,
    name: &str,
    size: u32,
    match_fields: Vec<Match>,
) -> FlowTableDesc {
    FlowTableDesc {
        table_type,
        table_id,
        name: name.to_string(),
        size,
        key_len: match_fields.iter().map(|f| f.len_bits).sum(),
        match_fields,
    }
}

/// A flow entry with no counter, cookie or timeouts.
pub fn flow_entry(
    table_type: TableType,
    table_id: u8,
    index: u32,
    priority: u16,
    matches: Vec<MatchX>,
    instructions: Vec<Instruction>,
) -> FlowEntry {
    FlowEntry {
        table_type,
        table_id,
        index,
        priority,
        counter_id: 0,
        cookie: 0,
        cookie_mask: 0,
        idle_timeout: 0,
        hard_timeout: 0,
        matches,
        instructions,
    }
}

/// OUTPUT the whole frame, without metadata.
pub fn output(port_id: u32) -> Action {
    Action::Output {
        port_id,
        metadata_offset: 0,
        metadata_len: 0,
        packet_offset: 0,
    }
}

pub fn apply(actions: Vec<Action>) -> Instruction {
    Instruction::ApplyActions(actions)
}

pub fn goto(next_table_id: u8, packet_offset: u16) -> Instruction {
    Instruction::GotoTable { next_table_id, packet_offset }
}

/// The destination MAC, as a match field.
pub fn dmac_field() -> Match {
    Match::packet(0, 48)
}

/// The global ID of a table under the default table counts.
pub fn global_id(table_type: TableType, table_id: u8) -> u8 {
    let store = ResourceStore::new(StoreCfg::default());
    store.table_id_to_global(table_type, table_id).unwrap()
}

/// A store with enabled ports `1..=ports`.
pub fn store_with_ports(ports: u32) -> ResourceStore {
    let mut store = ResourceStore::new(StoreCfg::default());
    for id in 1..=ports {
        store.add_port(port(id)).unwrap();
    }
    store
}

/// A two-table L2 pipeline.
///
/// * MM table 0 (`l2-first`) has a single wildcard entry that jumps
///   to EM table 0 without moving the window.
/// * EM table 0 (`l2-dmac`) matches the destination MAC. For each
///   port `n`, the entry in slot `n` sends frames for `mac(n)` out of
///   port `n` and counts them on counter `n`.
pub fn l2_switch(ports: u32) -> ResourceStore {
    let mut store = store_with_ports(ports);
    store
        .create_flow_table(table_desc(TableType::Mm, 0, "l2-first", 4, vec![]))
        .unwrap();
    store
        .create_flow_table(table_desc(
            TableType::Em,
            0,
            "l2-dmac",
            ports + 1,
            vec![dmac_field()],
        ))
        .unwrap();

    let em0 = global_id(TableType::Em, 0);
    store
        .add_flow_entry(flow_entry(
            TableType::Mm,
            0,
            0,
            0,
            vec![],
            vec![goto(em0, 0)],
        ))
        .unwrap();

    for n in 1..=ports {
        let mut e = flow_entry(
            TableType::Em,
            0,
            n,
            1,
            vec![MatchX::new(dmac_field(), &mac(n as u8), &[0xff; 6])],
            vec![apply(vec![output(n)])],
        );
        e.counter_id = n;
        store.add_flow_entry(e).unwrap();
    }

    store
}
