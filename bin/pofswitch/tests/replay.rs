// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Captures replayed through a whole switch.

use pof::engine::MissPolicy;
use pof::engine::port::ReceiveFilter;
use pof_test_utils::pcap::PcapBuilder;
use pof_test_utils::*;
use pofswitch::Rules;
use pofswitch::Switch;
use pofswitch::SwitchConfig;
use pofswitch::logging;
use pofswitch::rules::PortRule;
use std::path::PathBuf;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("pofswitch-{}-{name}.pcap", std::process::id()))
}

/// The two-table L2 switch from the test fixtures, as a rules file.
fn l2_rules(ports: u32) -> Rules {
    let em0 = global_id(TableType::Em, 0);
    let mut entries =
        vec![flow_entry(TableType::Mm, 0, 0, 0, vec![], vec![goto(em0, 0)])];
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
        entries.push(e);
    }

    Rules {
        ports: (1..=ports)
            .map(|id| PortRule {
                id,
                name: None,
                mac: mac(id as u8),
                enable: true,
                mtu: DEFAULT_PORT_MTU,
            })
            .collect(),
        tables: vec![
            table_desc(TableType::Mm, 0, "l2-first", 4, vec![]),
            table_desc(TableType::Em, 0, "l2-dmac", ports + 1, vec![
                dmac_field(),
            ]),
        ],
        entries,
        ..Default::default()
    }
}

fn switch_cfg() -> SwitchConfig {
    SwitchConfig {
        rx_filter: ReceiveFilter::Promiscuous,
        ..Default::default()
    }
}

fn to(n: u8) -> Vec<u8> {
    ipv4_frame(mac(n), mac(1), [10, 0, 0, 1], [10, 0, 0, n], 64, 30)
}

#[test]
fn replay_l2_capture() {
    let path = temp_path("l2");
    let mut pcap = PcapBuilder::new(&path);
    let frames = [to(2), to(3), to(2), to(9), to(2), to(3)];
    for f in &frames {
        pcap.add_frame(f);
    }
    drop(pcap);

    let frames = pofswitch::pcap::read_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(frames.len(), 6);

    let sw = Switch::new(switch_cfg(), logging::discard()).unwrap();
    let report = sw.replay(&l2_rules(3), &frames, 1, WAIT).unwrap();

    assert_eq!(report.sent_on(2).count(), 3);
    assert!(report.sent_on(2).all(|f| f == to(2)));
    assert_eq!(report.sent_on(3).count(), 2);
    assert_eq!(report.sent_on(1).count(), 0);
    assert!(report.upcalls.is_empty());
    let added: Vec<u32> = report
        .port_status
        .iter()
        .filter(|ps| ps.reason == PortReason::Add)
        .map(|ps| ps.port.port_id)
        .collect();
    assert_eq!(added, vec![1, 2, 3]);

    assert_eq!(report.stats.rx_packets, 6);
    assert_eq!(report.stats.forwarded, 5);
    assert_eq!(report.stats.dropped, 1);
    assert_eq!(report.stats.tx_packets, 5);

    assert!(report.counters.contains(&CounterResp { counter_id: 2, value: 3 }));
    assert!(report.counters.contains(&CounterResp { counter_id: 3, value: 2 }));
}

#[test]
fn misses_go_up_as_packet_ins() {
    let cfg = SwitchConfig { miss_policy: MissPolicy::PacketIn, ..switch_cfg() };
    let sw = Switch::new(cfg, logging::discard()).unwrap();
    let report = sw.replay(&l2_rules(2), &[to(7)], 1, WAIT).unwrap();

    assert!(report.sent.is_empty());
    assert_eq!(report.stats.packet_ins, 1);
    match &report.upcalls[..] {
        [Upcall::PacketIn(pi)] => {
            assert_eq!(pi.reason, REASON_NO_MATCH);
            assert_eq!(pi.data, to(7));
        }
        other => panic!("expected one packet-in, got {other:?}"),
    }
}

#[test]
fn replay_needs_ingress_port() {
    let sw = Switch::new(switch_cfg(), logging::discard()).unwrap();
    let err = sw.replay(&l2_rules(2), &[to(2)], 5, WAIT).unwrap_err();
    assert!(err.to_string().contains("port 5"));
}

#[test]
fn bad_rules_name_the_entry() {
    let mut rules = l2_rules(2);
    rules.entries[1].index = 100;
    let sw = Switch::new(switch_cfg(), logging::discard()).unwrap();
    let err = sw.load_rules(&rules).unwrap_err();
    assert!(format!("{err:#}").contains("adding entry 100"));
}

#[test]
fn auto_clear_on_disconnect() {
    let rules = l2_rules(2);

    let sw = Switch::new(switch_cfg(), logging::discard()).unwrap();
    sw.load_rules(&rules).unwrap();
    let store = sw.disconnect();
    assert_eq!(store.read().iter_tables().count(), 2);

    let cfg = SwitchConfig { auto_clear: true, ..switch_cfg() };
    let sw = Switch::new(cfg, logging::discard()).unwrap();
    sw.load_rules(&rules).unwrap();
    assert_eq!(sw.hdl().list_ports().unwrap().ports.len(), 2);
    let store = sw.disconnect();
    assert_eq!(store.read().iter_tables().count(), 0);
    assert!(store.read().ports().iter().all(|p| !p.of_enable));
}
