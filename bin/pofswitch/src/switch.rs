// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A whole switch: resource store, control thread and, for replays,
//! the datapath threads.

use crate::config::SwitchConfig;
use crate::report::ReplayReport;
use crate::report::SentFrame;
use crate::rules::Rules;
use anyhow::Context;
use anyhow::anyhow;
use pof::engine::ResourceStore;
use pof::engine::SharedStore;
use pof::engine::ctl::ControlPlane;
use pof::engine::datapath::ChannelController;
use pof::engine::datapath::Datapath;
use pof::engine::datapath::MemPortPeer;
use pof::engine::datapath::mem_port;
use pof::provider::Providers;
use pof_ctl::CtlHdl;
use slog::Logger;
use slog::debug;
use slog::info;
use slog::o;
use slog::warn;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

pub struct Switch {
    cfg: SwitchConfig,
    store: SharedStore,
    hdl: CtlHdl,
    ctl: ControlPlane,
    log: Logger,
}

impl Switch {
    /// Create an empty switch and start its control thread.
    pub fn new(cfg: SwitchConfig, log: Logger) -> anyhow::Result<Self> {
        let store = ResourceStore::new(cfg.store_cfg()).shared();
        let providers = Providers::slog(log.new(o!("unit" => "ctl")));
        let ctl = ControlPlane::spawn(store.clone(), providers, cfg.auto_clear)
            .context("starting control plane")?;
        let hdl = CtlHdl::open(&ctl)?;
        info!(log, "switch up"; "device_id" => cfg.device_id);
        Ok(Self { cfg, store, hdl, ctl, log })
    }

    pub fn hdl(&self) -> &CtlHdl {
        &self.hdl
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Stop the control thread. With `auto-clear` set this empties the
    /// store.
    pub fn disconnect(self) -> SharedStore {
        let Self { store, hdl, mut ctl, log, .. } = self;
        drop(hdl);
        ctl.disconnect();
        debug!(log, "control plane disconnected");
        store
    }

    /// Register every port and install the rest of the rules.
    pub fn load_rules(&self, rules: &Rules) -> anyhow::Result<()> {
        rules.add_ports(&self.hdl)?;
        self.install_rules(rules)
    }

    fn install_rules(&self, rules: &Rules) -> anyhow::Result<()> {
        rules.install(&self.hdl)?;
        info!(self.log, "rules installed";
            "tables" => rules.tables.len(),
            "entries" => rules.entries.len(),
            "groups" => rules.groups.len());
        Ok(())
    }

    /// Install `rules`, attach an in-memory port for each of its ports
    /// and feed `frames` in through port `in_port`. Returns once every
    /// frame has been dealt with, or fails after `timeout`.
    pub fn replay(
        &self,
        rules: &Rules,
        frames: &[Vec<u8>],
        in_port: u32,
        timeout: Duration,
    ) -> anyhow::Result<ReplayReport> {
        self.install_rules(rules)?;

        let (controller, upcall_rx) =
            ChannelController::new(self.cfg.queue_depth);
        let providers = Providers::slog(self.log.new(o!("unit" => "datapath")));
        let mut dp = Datapath::new(
            self.cfg.datapath_cfg(),
            self.store.clone(),
            Arc::new(controller),
            providers,
        )
        .context("starting datapath")?;

        let mut peers: BTreeMap<u32, MemPortPeer> = BTreeMap::new();
        for p in &rules.ports {
            let (rx, tx, peer) = mem_port();
            dp.add_port(p.desc(), Box::new(rx), Box::new(tx))
                .with_context(|| format!("attaching port {}", p.id))?;
            peers.insert(p.id, peer);
        }

        let ingress = peers
            .get(&in_port)
            .ok_or_else(|| anyhow!("port {in_port} is not in the rules"))?;
        info!(self.log, "replaying";
            "frames" => frames.len(), "port" => in_port);
        for f in frames {
            if !ingress.inject(f) {
                return Err(anyhow!("port {in_port} closed during replay"));
            }
        }

        let mut report = ReplayReport::new(frames.len());
        let deadline = Instant::now() + timeout;
        let want = frames.len() as u64;
        loop {
            // Keep the upcall channel drained so the forwarding thread
            // never blocks on it.
            upcall_rx.try_iter().for_each(|u| report.record(u));
            collect_sent(&peers, &mut report.sent);

            let stats = dp.stats();
            if stats.rx_packets + stats.rx_filtered == want && stats.is_idle() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(self.log, "replay timed out"; "stats" => ?stats);
                return Err(anyhow!(
                    "replay did not finish within {timeout:?}: {stats:?}"
                ));
            }
            thread::sleep(Duration::from_millis(5));
        }

        dp.shutdown();
        upcall_rx.try_iter().for_each(|u| report.record(u));
        collect_sent(&peers, &mut report.sent);
        report.stats = dp.stats();
        report.counters = self.store.read().dump_counters().counters;
        Ok(report)
    }
}

fn collect_sent(peers: &BTreeMap<u32, MemPortPeer>, sent: &mut Vec<SentFrame>) {
    for (&port_id, peer) in peers {
        while let Some(data) = peer.try_recv_sent() {
            sent.push(SentFrame { port_id, data });
        }
    }
}
