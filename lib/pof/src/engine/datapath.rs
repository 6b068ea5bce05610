// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The datapath threads.
//!
//! ```text
//!   port rx ──┐
//!   port rx ──┼──> recv queue ──> forwarding ──> send queue ──> sender ──> port tx
//!   port rx ──┘                       │
//!                                     └──> Controller (packet-in, errors)
//! ```
//!
//! Each port gets its own receiver thread, which applies the receive
//! filter and enqueues accepted frames. A single forwarding thread
//! runs the whole pipeline for one packet, under the store's read
//! lock, before it dequeues the next. A single sender thread writes
//! output records to the transmit side of their port.
//!
//! Both queues are bounded. A full send queue stalls the forwarding
//! thread, which in turn fills the receive queue and stalls the
//! receivers.
//!
//! Ports added, removed, enabled or disabled through [`Datapath`] are
//! reported to the [`Controller`] as port-status upcalls.

use super::action::OutputRecord;
use super::packet::PacketContext;
use super::pipeline::DropReason;
use super::pipeline::Pipeline;
use super::pipeline::PipelineCfg;
use super::pipeline::ProcessOutcome;
use super::pipeline::ProcessResult;
use super::port::ReceiveFilter;
use super::port::RxVerdict;
use super::port::rx_verdict;
use super::resource::SharedStore;
use crate::provider::LogLevel;
use crate::provider::Providers;
use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use pof_api::ErrorMsg;
use pof_api::PacketIn;
use pof_api::PofError;
use pof_api::PortDesc;
use pof_api::PortReason;
use pof_api::PortStatus;
use pof_api::Upcall;
use pof_api::defaults;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

type Result<T> = core::result::Result<T, PofError>;

/// How long a blocked thread waits before it rechecks for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A frame handed up by a port.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RxFrame {
    pub data: Vec<u8>,
    /// The port saw this frame go out, not come in.
    pub outgoing: bool,
}

#[derive(Debug)]
pub enum RxPoll {
    Frame(RxFrame),
    /// Nothing arrived within the port's poll interval.
    Idle,
    /// The port is gone; the receiver thread exits.
    Closed,
}

/// The receive side of a port.
///
/// `recv()` should block for no longer than about [`POLL_INTERVAL`]
/// before returning `Idle`, so that its thread can notice
/// cancellation.
pub trait PortRx: Send {
    fn recv(&mut self) -> io::Result<RxPoll>;
}

/// The transmit side of a port.
pub trait PortTx: Send {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Where upcalls and error reports go.
pub trait Controller: Send + Sync {
    fn packet_in(&self, pi: PacketIn) -> Result<()>;
    fn port_status(&self, ps: PortStatus) -> Result<()>;
    fn error(&self, msg: ErrorMsg) -> Result<()>;
}

/// A controller that forwards every upcall over a channel.
#[derive(Clone, Debug)]
pub struct ChannelController {
    tx: Sender<Upcall>,
}

impl ChannelController {
    pub fn new(depth: usize) -> (Self, Receiver<Upcall>) {
        let (tx, rx) = bounded(depth);
        (Self { tx }, rx)
    }
}

impl Controller for ChannelController {
    fn packet_in(&self, pi: PacketIn) -> Result<()> {
        self.tx
            .send(Upcall::PacketIn(pi))
            .map_err(|_| PofError::QueueFailure)
    }

    /// Never blocks: port changes come from admin callers, which
    /// may be the same thread that drains the channel.
    fn port_status(&self, ps: PortStatus) -> Result<()> {
        self.tx
            .try_send(Upcall::PortStatus(ps))
            .map_err(|_| PofError::QueueFailure)
    }

    fn error(&self, msg: ErrorMsg) -> Result<()> {
        self.tx
            .send(Upcall::Error(msg))
            .map_err(|_| PofError::QueueFailure)
    }
}

// ================================================================
// In-memory ports
// ================================================================

/// The receive half of an in-memory port.
pub struct MemPortRx {
    rx: Receiver<RxFrame>,
}

/// The transmit half of an in-memory port.
pub struct MemPortTx {
    tx: Sender<Vec<u8>>,
}

/// The far end of an in-memory port: inject frames into the switch
/// and collect what it sends.
pub struct MemPortPeer {
    inject: Sender<RxFrame>,
    sent: Receiver<Vec<u8>>,
}

/// Create a connected in-memory port.
pub fn mem_port() -> (MemPortRx, MemPortTx, MemPortPeer) {
    let (inject, rx) = crossbeam_channel::unbounded();
    let (tx, sent) = crossbeam_channel::unbounded();
    (MemPortRx { rx }, MemPortTx { tx }, MemPortPeer { inject, sent })
}

impl PortRx for MemPortRx {
    fn recv(&mut self) -> io::Result<RxPoll> {
        match self.rx.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => Ok(RxPoll::Frame(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(RxPoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(RxPoll::Closed),
        }
    }
}

impl PortTx for MemPortTx {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx.send(frame.to_vec()).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "peer went away")
        })
    }
}

impl MemPortPeer {
    /// Hand a frame to the switch as if it arrived on the wire.
    pub fn inject(&self, data: &[u8]) -> bool {
        self.inject
            .send(RxFrame { data: data.to_vec(), outgoing: false })
            .is_ok()
    }

    /// Hand the switch a frame flagged as one of its own.
    pub fn inject_outgoing(&self, data: &[u8]) -> bool {
        self.inject
            .send(RxFrame { data: data.to_vec(), outgoing: true })
            .is_ok()
    }

    /// Wait for the next frame the switch sends out this port.
    pub fn recv_sent(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.sent.recv_timeout(timeout).ok()
    }

    pub fn try_recv_sent(&self) -> Option<Vec<u8>> {
        self.sent.try_recv().ok()
    }
}

// ================================================================
// Statistics
// ================================================================

#[derive(Debug, Default)]
struct Stats {
    rx_packets: AtomicU64,
    rx_filtered: AtomicU64,
    processed: AtomicU64,
    forwarded: AtomicU64,
    packet_ins: AtomicU64,
    dropped: AtomicU64,
    consumed: AtomicU64,
    errors: AtomicU64,
    tx_queued: AtomicU64,
    tx_packets: AtomicU64,
    tx_errors: AtomicU64,
}

/// A point-in-time copy of the datapath counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatapathStats {
    pub rx_packets: u64,
    pub rx_filtered: u64,
    /// Packets the forwarding thread has finished with, whatever the
    /// outcome.
    pub processed: u64,
    pub forwarded: u64,
    pub packet_ins: u64,
    pub dropped: u64,
    pub consumed: u64,
    pub errors: u64,
    /// Output records handed to the sender thread.
    pub tx_queued: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
}

impl DatapathStats {
    /// Every accepted packet has been through the pipeline and every
    /// output record has been written or failed.
    pub fn is_idle(&self) -> bool {
        self.processed == self.rx_packets
            && self.tx_packets + self.tx_errors == self.tx_queued
    }
}

impl Stats {
    fn bump(c: &AtomicU64) {
        c.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DatapathStats {
        let ld = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DatapathStats {
            rx_packets: ld(&self.rx_packets),
            rx_filtered: ld(&self.rx_filtered),
            processed: ld(&self.processed),
            forwarded: ld(&self.forwarded),
            packet_ins: ld(&self.packet_ins),
            dropped: ld(&self.dropped),
            consumed: ld(&self.consumed),
            errors: ld(&self.errors),
            tx_queued: ld(&self.tx_queued),
            tx_packets: ld(&self.tx_packets),
            tx_errors: ld(&self.tx_errors),
        }
    }
}

// ================================================================
// The datapath
// ================================================================

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DatapathCfg {
    #[serde(default)]
    pub pipeline: PipelineCfg,
    #[serde(default)]
    pub rx_filter: ReceiveFilter,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    defaults::QUEUE_DEPTH
}

impl Default for DatapathCfg {
    fn default() -> Self {
        Self {
            pipeline: PipelineCfg::default(),
            rx_filter: ReceiveFilter::default(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// A frame accepted by a receiver thread.
struct RxPacket {
    port_id: u32,
    data: Vec<u8>,
}

struct RxWorker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

type TxPorts = Arc<Mutex<HashMap<u32, Box<dyn PortTx>>>>;

/// State shared by every datapath thread.
struct Shared {
    store: SharedStore,
    controller: Arc<dyn Controller>,
    providers: Providers,
    stats: Stats,
    next_xid: AtomicU32,
    running: AtomicBool,
}

impl Shared {
    fn next_xid(&self) -> u32 {
        self.next_xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Log an error and report it upward with a fresh xid.
    fn report(&self, err: &PofError, what: &str) {
        let xid = self.next_xid();
        self.providers
            .log
            .log(LogLevel::Error, &format!("{what}: {err} (xid {xid})"));
        if self.controller.error(ErrorMsg::new(err, xid)).is_err() {
            self.providers.log.log(
                LogLevel::Warn,
                &format!("{what}: controller gone, error xid {xid} lost"),
            );
        }
    }

    fn port_status(&self, reason: PortReason, port: PortDesc) {
        let port_id = port.port_id;
        if self.controller.port_status(PortStatus { reason, port }).is_err() {
            self.providers.log.log(
                LogLevel::Warn,
                &format!("port {port_id}: {reason:?} status not delivered"),
            );
        }
    }
}

pub struct Datapath {
    shared: Arc<Shared>,
    filter: ReceiveFilter,
    recv_tx: Sender<RxPacket>,
    rx_workers: Mutex<HashMap<u32, RxWorker>>,
    tx_ports: TxPorts,
    fwd: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl Datapath {
    /// Start the forwarding and sender threads. Ports are attached
    /// afterwards with [`Datapath::add_port()`].
    pub fn new(
        cfg: DatapathCfg,
        store: SharedStore,
        controller: Arc<dyn Controller>,
        providers: Providers,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            store,
            controller,
            providers,
            stats: Stats::default(),
            next_xid: AtomicU32::new(1),
            running: AtomicBool::new(true),
        });

        let depth = cfg.queue_depth.max(1);
        let (recv_tx, recv_rx) = bounded::<RxPacket>(depth);
        let (send_tx, send_rx) = bounded::<OutputRecord>(depth);
        let tx_ports: TxPorts = Arc::new(Mutex::new(HashMap::new()));

        let pipeline = Pipeline::new(cfg.pipeline);
        let fwd_shared = shared.clone();
        let fwd = thread::Builder::new()
            .name("pof-fwd".to_string())
            .spawn(move || forward(fwd_shared, pipeline, recv_rx, send_tx))
            .map_err(|_| PofError::AllocationFailure)?;

        let snd_shared = shared.clone();
        let snd_ports = tx_ports.clone();
        let sender = thread::Builder::new()
            .name("pof-send".to_string())
            .spawn(move || send(snd_shared, send_rx, snd_ports))
            .map_err(|_| {
                shared.running.store(false, Ordering::Relaxed);
                PofError::AllocationFailure
            })?;

        Ok(Self {
            shared,
            filter: cfg.rx_filter,
            recv_tx,
            rx_workers: Mutex::new(HashMap::new()),
            tx_ports,
            fwd: Some(fwd),
            sender: Some(sender),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.shared.store
    }

    /// Register a port with the store and start its receiver thread.
    pub fn add_port(
        &self,
        desc: PortDesc,
        rx: Box<dyn PortRx>,
        tx: Box<dyn PortTx>,
    ) -> Result<()> {
        let port_id = desc.port_id;
        let status = desc.clone();
        self.shared.store.write().add_port(desc)?;
        self.tx_ports.lock().insert(port_id, tx);

        let cancel = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let filter = self.filter;
        let recv_tx = self.recv_tx.clone();
        let rx_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("pof-rx-{port_id}"))
            .spawn(move || {
                receive(shared, port_id, filter, rx, recv_tx, rx_cancel)
            });

        match spawned {
            Ok(handle) => {
                self.rx_workers
                    .lock()
                    .insert(port_id, RxWorker { cancel, handle });
                self.shared.port_status(PortReason::Add, status);
                Ok(())
            }
            Err(_) => {
                self.tx_ports.lock().remove(&port_id);
                // Undo the registration above; it cannot fail.
                let _ = self.shared.store.write().remove_port(port_id);
                Err(PofError::AllocationFailure)
            }
        }
    }

    /// Stop a port's receiver and forget the port.
    pub fn remove_port(&self, port_id: u32) -> Result<PortDesc> {
        let worker = self.rx_workers.lock().remove(&port_id);
        if let Some(w) = worker {
            w.cancel.store(true, Ordering::Relaxed);
            let _ = w.handle.join();
        }
        self.tx_ports.lock().remove(&port_id);
        let desc = self.shared.store.write().remove_port(port_id)?;
        self.shared.port_status(PortReason::Delete, desc.clone());
        Ok(desc)
    }

    /// Turn forwarding on or off for a port. The receive filter sees
    /// the change on the next frame.
    pub fn enable_port(&self, port_id: u32, enable: bool) -> Result<()> {
        let desc = self.shared.store.write().port_enable(port_id, enable)?;
        self.shared.port_status(PortReason::Modify, desc);
        Ok(())
    }

    pub fn stats(&self) -> DatapathStats {
        self.shared.stats.snapshot()
    }

    /// Wait until `pred` holds for the stats, or the timeout expires.
    #[cfg(any(test, feature = "test-help"))]
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&DatapathStats) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if pred(&self.stats()) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stop every thread and wait for them to exit. Packets still
    /// queued are discarded.
    pub fn shutdown(&mut self) {
        for (_, w) in self.rx_workers.lock().drain() {
            w.cancel.store(true, Ordering::Relaxed);
            let _ = w.handle.join();
        }

        self.shared.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.fwd.take() {
            let _ = h.join();
        }
        if let Some(h) = self.sender.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Datapath {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive(
    shared: Arc<Shared>,
    port_id: u32,
    filter: ReceiveFilter,
    mut rx: Box<dyn PortRx>,
    recv_tx: Sender<RxPacket>,
    cancel: Arc<AtomicBool>,
) {
    while !cancel.load(Ordering::Relaxed) {
        let frame = match rx.recv() {
            Ok(RxPoll::Frame(frame)) => frame,
            Ok(RxPoll::Idle) => continue,
            Ok(RxPoll::Closed) => break,
            Err(e) => {
                shared.providers.log.log(
                    LogLevel::Error,
                    &format!("port {port_id}: receive failed: {e}"),
                );
                shared.report(&PofError::QueueFailure, "receive");
                break;
            }
        };

        let verdict = match shared.store.read().check_port_index(port_id) {
            Ok(port) => rx_verdict(port, filter, &frame.data, frame.outgoing),
            // Removed while we were waiting.
            Err(_) => break,
        };

        if verdict != RxVerdict::Accept {
            Stats::bump(&shared.stats.rx_filtered);
            continue;
        }

        Stats::bump(&shared.stats.rx_packets);
        let pkt = RxPacket { port_id, data: frame.data };
        if recv_tx.send(pkt).is_err() {
            break;
        }
    }
}

fn forward(
    shared: Arc<Shared>,
    pipeline: Pipeline,
    recv_rx: Receiver<RxPacket>,
    send_tx: Sender<OutputRecord>,
) {
    loop {
        let rx_pkt = match recv_rx.recv_timeout(POLL_INTERVAL) {
            Ok(p) => p,
            Err(RecvTimeoutError::Timeout) => {
                if !shared.running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut pkt = match PacketContext::new(&rx_pkt.data, rx_pkt.port_id) {
            Ok(pkt) => pkt,
            Err(e) => {
                Stats::bump(&shared.stats.errors);
                Stats::bump(&shared.stats.processed);
                shared.report(&e, "packet");
                continue;
            }
        };

        let outcome = {
            let store = shared.store.read();
            pipeline.process(&store, &mut pkt)
        };

        if !finish_packet(&shared, outcome, &send_tx) {
            return;
        }
    }
}

/// Hand a processed packet's outputs and upcalls on, and count it as
/// processed whatever happens. Returns `false` when the forwarding
/// thread has to stop.
fn finish_packet(
    shared: &Shared,
    outcome: ProcessOutcome,
    send_tx: &Sender<OutputRecord>,
) -> bool {
    let keep_going = hand_off(shared, outcome, send_tx);
    Stats::bump(&shared.stats.processed);
    keep_going
}

fn hand_off(
    shared: &Shared,
    outcome: ProcessOutcome,
    send_tx: &Sender<OutputRecord>,
) -> bool {
    for rec in outcome.outputs {
        if send_tx.send(rec).is_err() {
            shared.report(&PofError::QueueFailure, "send queue");
            return false;
        }
        Stats::bump(&shared.stats.tx_queued);
    }

    for pi in outcome.packet_ins {
        Stats::bump(&shared.stats.packet_ins);
        if let Err(e) = shared.controller.packet_in(pi) {
            shared.report(&e, "packet-in");
        }
    }

    match outcome.result {
        ProcessResult::Forwarded { .. } => Stats::bump(&shared.stats.forwarded),
        ProcessResult::PacketIn => {}
        ProcessResult::Dropped { reason: DropReason::Error(e) } => {
            Stats::bump(&shared.stats.errors);
            shared.report(&e, "pipeline");
            if e.is_fatal() {
                return false;
            }
        }
        ProcessResult::Dropped { .. } => Stats::bump(&shared.stats.dropped),
        ProcessResult::Consumed => Stats::bump(&shared.stats.consumed),
    }
    true
}

fn send(
    shared: Arc<Shared>,
    send_rx: Receiver<OutputRecord>,
    tx_ports: TxPorts,
) {
    loop {
        let rec = match send_rx.recv_timeout(POLL_INTERVAL) {
            Ok(rec) => rec,
            Err(RecvTimeoutError::Timeout) => {
                if !shared.running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut ports = tx_ports.lock();
        let Some(port) = ports.get_mut(&rec.port_id) else {
            Stats::bump(&shared.stats.tx_errors);
            shared.providers.log.log(
                LogLevel::Warn,
                &format!("port {}: no transmit side", rec.port_id),
            );
            continue;
        };

        match port.send(&rec.wire_bytes()) {
            Ok(()) => Stats::bump(&shared.stats.tx_packets),
            Err(e) => {
                // The port is dead to us; stop sending to it.
                ports.remove(&rec.port_id);
                drop(ports);
                Stats::bump(&shared.stats.tx_errors);
                shared.providers.log.log(
                    LogLevel::Error,
                    &format!("port {}: send failed: {e}", rec.port_id),
                );
                shared.report(&PofError::QueueFailure, "send");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::resource::ResourceStore;
    use crate::provider::PrintlnLog;
    use crate::provider::test::VecLog;
    use pof_api::Action;
    use pof_api::FlowEntry;
    use pof_api::FlowTableDesc;
    use pof_api::Instruction;
    use pof_api::TableType;

    const WAIT: Duration = Duration::from_secs(5);

    fn forward_all_to(port_id: u32) -> SharedStore {
        let mut rs = ResourceStore::new(Default::default());
        rs.create_flow_table(FlowTableDesc {
            table_type: TableType::Mm,
            table_id: 0,
            name: "first".into(),
            size: 4,
            key_len: 0,
            match_fields: vec![],
        })
        .unwrap();
        rs.add_flow_entry(FlowEntry {
            table_type: TableType::Mm,
            table_id: 0,
            index: 0,
            priority: 0,
            counter_id: 1,
            cookie: 0,
            cookie_mask: 0,
            idle_timeout: 0,
            hard_timeout: 0,
            matches: vec![],
            instructions: vec![Instruction::ApplyActions(vec![Action::Output {
                port_id,
                metadata_offset: 0,
                metadata_len: 0,
                packet_offset: 0,
            }])],
        })
        .unwrap();
        rs.shared()
    }

    fn port(id: u32) -> PortDesc {
        let mut p = PortDesc::new(id, &format!("mem{id}"), [2, 0, 0, 0, 0, id as u8]);
        p.of_enable = true;
        p
    }

    fn datapath(store: SharedStore, filter: ReceiveFilter) -> (Datapath, Receiver<Upcall>) {
        let (ctl, upcalls) = ChannelController::new(16);
        let cfg = DatapathCfg { rx_filter: filter, ..Default::default() };
        let dp = Datapath::new(
            cfg,
            store,
            Arc::new(ctl),
            Providers { log: Arc::new(PrintlnLog) },
        )
        .unwrap();
        (dp, upcalls)
    }

    #[test]
    fn forwards_between_mem_ports() {
        let (mut dp, _upcalls) =
            datapath(forward_all_to(2), ReceiveFilter::Promiscuous);
        let (rx1, tx1, peer1) = mem_port();
        let (rx2, tx2, peer2) = mem_port();
        dp.add_port(port(1), Box::new(rx1), Box::new(tx1)).unwrap();
        dp.add_port(port(2), Box::new(rx2), Box::new(tx2)).unwrap();

        let frame: Vec<u8> = (0..60).collect();
        assert!(peer1.inject(&frame));
        assert_eq!(peer2.recv_sent(WAIT), Some(frame));
        assert!(dp.wait_for(WAIT, |s| s.tx_packets == 1));
        assert_eq!(dp.store().read().counter_get(1), Ok(1));

        dp.shutdown();
        let stats = dp.stats();
        assert_eq!(stats.rx_packets, 1);
        assert_eq!(stats.forwarded, 1);
    }

    #[test]
    fn filtered_frames_never_reach_pipeline() {
        let (mut dp, _upcalls) =
            datapath(forward_all_to(2), ReceiveFilter::NonPromiscuous);
        let (rx1, tx1, peer1) = mem_port();
        let (rx2, tx2, peer2) = mem_port();
        dp.add_port(port(1), Box::new(rx1), Box::new(tx1)).unwrap();
        dp.add_port(port(2), Box::new(rx2), Box::new(tx2)).unwrap();

        // Addressed to some other host.
        let mut frame = vec![0u8; 60];
        frame[..6].copy_from_slice(&[2, 0, 0, 0, 0, 9]);
        assert!(peer1.inject(&frame));
        // Our own transmission, looped back.
        assert!(peer1.inject_outgoing(&[0xff; 60]));

        assert!(dp.wait_for(WAIT, |s| s.rx_filtered == 2));
        assert_eq!(peer2.try_recv_sent(), None);
        dp.shutdown();
        assert_eq!(dp.stats().rx_packets, 0);
    }

    #[test]
    fn errors_go_to_controller() {
        // The output port has no transmit side registered.
        let (mut dp, upcalls) =
            datapath(forward_all_to(7), ReceiveFilter::Promiscuous);
        let (rx1, tx1, peer1) = mem_port();
        dp.add_port(port(1), Box::new(rx1), Box::new(tx1)).unwrap();
        assert!(matches!(
            upcalls.try_recv(),
            Ok(Upcall::PortStatus(PortStatus { reason: PortReason::Add, .. }))
        ));

        assert!(peer1.inject(&[0xff; 60]));
        match upcalls.recv_timeout(WAIT) {
            Ok(Upcall::Error(msg)) => {
                let want = ErrorMsg::new(&PofError::BadPortId(7), msg.xid);
                assert_eq!(msg, want);
            }
            other => panic!("unexpected upcall: {other:?}"),
        }
        dp.shutdown();
        assert_eq!(dp.stats().errors, 1);
    }

    #[test]
    fn remove_port_stops_receiver() {
        let (mut dp, _upcalls) =
            datapath(forward_all_to(1), ReceiveFilter::Promiscuous);
        let (rx1, tx1, peer1) = mem_port();
        dp.add_port(port(1), Box::new(rx1), Box::new(tx1)).unwrap();
        assert_eq!(dp.add_port(port(1), Box::new(mem_port().0), Box::new(mem_port().1)).err(),
            Some(PofError::PortExist(1)));

        let removed = dp.remove_port(1).unwrap();
        assert_eq!(removed.port_id, 1);
        assert!(!peer1.inject(&[0xff; 60]));
        assert_eq!(dp.remove_port(1).err(), Some(PofError::BadPortId(1)));
        dp.shutdown();
    }

    fn shared(controller: ChannelController) -> Shared {
        Shared {
            store: ResourceStore::new(Default::default()).shared(),
            controller: Arc::new(controller),
            providers: Providers { log: Arc::new(PrintlnLog) },
            stats: Stats::default(),
            next_xid: AtomicU32::new(1),
            running: AtomicBool::new(true),
        }
    }

    #[test]
    fn stopping_packets_are_still_counted() {
        let (ctl, _upcalls) = ChannelController::new(4);
        let shared = shared(ctl);
        let (send_tx, send_rx) = bounded(1);

        let fatal = ProcessOutcome {
            result: ProcessResult::Dropped {
                reason: DropReason::Error(PofError::QueueFailure),
            },
            outputs: vec![],
            packet_ins: vec![],
        };
        assert!(!finish_packet(&shared, fatal, &send_tx));
        let st = shared.stats.snapshot();
        assert_eq!((st.processed, st.errors), (1, 1));

        // The send queue has gone away under a forwarded packet.
        drop(send_rx);
        let forwarded = ProcessOutcome {
            result: ProcessResult::Forwarded { outputs: 1 },
            outputs: vec![OutputRecord {
                port_id: 2,
                metadata: vec![],
                packet: vec![0; 60],
            }],
            packet_ins: vec![],
        };
        assert!(!finish_packet(&shared, forwarded, &send_tx));
        let st = shared.stats.snapshot();
        assert_eq!(st.processed, 2);
        assert_eq!(st.tx_queued, 0);
    }

    #[test]
    fn undeliverable_reports_are_logged() {
        let (ctl, upcalls) = ChannelController::new(4);
        drop(upcalls);
        let log = Arc::new(VecLog::default());
        let mut dp = Datapath::new(
            DatapathCfg {
                rx_filter: ReceiveFilter::Promiscuous,
                ..Default::default()
            },
            forward_all_to(7),
            Arc::new(ctl),
            Providers { log: log.clone() },
        )
        .unwrap();
        let (rx1, tx1, peer1) = mem_port();
        dp.add_port(port(1), Box::new(rx1), Box::new(tx1)).unwrap();

        // Port 7 has no transmit side, so the packet errors.
        assert!(peer1.inject(&[0xff; 60]));
        assert!(dp.wait_for(WAIT, |s| s.processed == 1));
        dp.shutdown();

        let warns: Vec<String> = log
            .messages()
            .into_iter()
            .filter(|(level, _)| *level == LogLevel::Warn)
            .map(|(_, msg)| msg)
            .collect();
        assert_eq!(warns.len(), 2, "{warns:?}");
        assert!(warns[0].contains("port 1: Add status not delivered"));
        assert!(warns[1].contains("controller gone"));
    }
}
