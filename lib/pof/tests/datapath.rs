// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Frames through the datapath threads, between in-memory ports.

use pof::engine::MissPolicy;
use pof::engine::datapath::ChannelController;
use pof::engine::datapath::Datapath;
use pof::engine::datapath::DatapathCfg;
use pof::engine::datapath::mem_port;
use pof::engine::port::ReceiveFilter;
use pof::provider::Providers;
use pof_test_utils::*;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

/// An L2 switch with no ports registered yet; the datapath adds them.
fn l2_store(ports: u32) -> pof::engine::SharedStore {
    let mut store = l2_switch(ports);
    for id in 1..=ports {
        store.remove_port(id).unwrap();
    }
    store.shared()
}

// Switch ports see frames for other hosts, so they must not filter
// them.
fn promiscuous() -> DatapathCfg {
    DatapathCfg { rx_filter: ReceiveFilter::Promiscuous, ..Default::default() }
}

#[test]
fn l2_switch_between_three_ports() {
    let (ctl, _upcalls) = ChannelController::new(64);
    let mut dp = Datapath::new(
        promiscuous(),
        l2_store(3),
        Arc::new(ctl),
        Providers::println(),
    )
    .unwrap();

    let mut peers = vec![];
    for id in 1..=3 {
        let (rx, tx, peer) = mem_port();
        dp.add_port(port(id), Box::new(rx), Box::new(tx)).unwrap();
        peers.push(peer);
    }

    // Port 1 talks to ports 2 and 3, in order.
    let to2 = ipv4_frame(mac(2), mac(1), [10, 0, 0, 1], [10, 0, 0, 2], 64, 40);
    let to3 = ipv4_frame(mac(3), mac(1), [10, 0, 0, 1], [10, 0, 0, 3], 64, 40);
    for _ in 0..10 {
        assert!(peers[0].inject(&to2));
        assert!(peers[0].inject(&to3));
    }

    for _ in 0..10 {
        assert_eq!(peers[1].recv_sent(WAIT).as_ref(), Some(&to2));
        assert_eq!(peers[2].recv_sent(WAIT).as_ref(), Some(&to3));
    }
    assert!(dp.wait_for(WAIT, |s| s.tx_packets == 20));
    assert_eq!(peers[0].try_recv_sent(), None);

    let store = dp.store().clone();
    assert_eq!(store.read().counter_get(2), Ok(10));
    assert_eq!(store.read().counter_get(3), Ok(10));

    dp.shutdown();
    let stats = dp.stats();
    assert_eq!(stats.rx_packets, 20);
    assert_eq!(stats.forwarded, 20);
    assert_eq!(stats.errors, 0);
}

#[test]
fn unknown_destination_upcall() {
    let (ctl, upcalls) = ChannelController::new(64);
    let cfg = DatapathCfg {
        pipeline: PipelineCfg { miss_policy: MissPolicy::PacketIn },
        rx_filter: ReceiveFilter::Promiscuous,
        ..Default::default()
    };
    let mut dp =
        Datapath::new(cfg, l2_store(2), Arc::new(ctl), Providers::println())
            .unwrap();
    let (rx, tx, peer) = mem_port();
    dp.add_port(port(1), Box::new(rx), Box::new(tx)).unwrap();
    assert!(matches!(upcalls.try_recv(), Ok(Upcall::PortStatus(_))));

    let frame = ipv4_frame(mac(42), mac(1), [10, 0, 0, 1], [10, 0, 0, 42], 64, 20);
    assert!(peer.inject(&frame));

    match upcalls.recv_timeout(WAIT) {
        Ok(Upcall::PacketIn(pi)) => {
            assert_eq!(pi.reason, REASON_NO_MATCH);
            assert_eq!(pi.data, frame);
            assert_eq!(pi.total_len as usize, frame.len());
        }
        other => panic!("expected packet-in, got {other:?}"),
    }

    dp.shutdown();
    assert_eq!(dp.stats().packet_ins, 1);
}

#[test]
fn disabled_port_is_ignored() {
    let (ctl, _upcalls) = ChannelController::new(64);
    let mut dp = Datapath::new(
        promiscuous(),
        l2_store(2),
        Arc::new(ctl),
        Providers::println(),
    )
    .unwrap();

    let (rx1, tx1, peer1) = mem_port();
    let (rx2, tx2, peer2) = mem_port();
    let mut p1 = port(1);
    p1.of_enable = false;
    dp.add_port(p1, Box::new(rx1), Box::new(tx1)).unwrap();
    dp.add_port(port(2), Box::new(rx2), Box::new(tx2)).unwrap();

    let frame = ipv4_frame(mac(2), mac(1), [10, 0, 0, 1], [10, 0, 0, 2], 64, 20);
    assert!(peer1.inject(&frame));
    assert!(dp.wait_for(WAIT, |s| s.rx_filtered == 1));
    assert_eq!(peer2.try_recv_sent(), None);

    // Enabling the port takes effect on the next frame.
    dp.enable_port(1, true).unwrap();
    assert!(peer1.inject(&frame));
    assert_eq!(peer2.recv_sent(WAIT), Some(frame));

    dp.shutdown();
}

#[test]
fn port_changes_reach_controller() {
    let (ctl, upcalls) = ChannelController::new(64);
    let dp = Datapath::new(
        promiscuous(),
        l2_store(2),
        Arc::new(ctl),
        Providers::println(),
    )
    .unwrap();

    let (rx, tx, _peer) = mem_port();
    dp.add_port(port(2), Box::new(rx), Box::new(tx)).unwrap();
    dp.enable_port(2, false).unwrap();
    dp.remove_port(2).unwrap();

    let seen: Vec<_> = upcalls
        .try_iter()
        .map(|u| match u {
            Upcall::PortStatus(ps) => {
                (ps.reason, ps.port.port_id, ps.port.of_enable)
            }
            other => panic!("expected port status, got {other:?}"),
        })
        .collect();
    assert_eq!(seen, vec![
        (PortReason::Add, 2, true),
        (PortReason::Modify, 2, false),
        (PortReason::Delete, 2, false),
    ]);

    // A failed change reports nothing.
    assert_eq!(dp.enable_port(2, true), Err(PofError::BadPortId(2)));
    assert!(upcalls.try_recv().is_err());
}
