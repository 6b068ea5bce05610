// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The control plane: administrative commands against the store.
//!
//! A command arrives as a [`CmdHeader`] and a postcard-encoded request
//! body. [`handle_cmd()`] checks the API version, decodes the body,
//! applies the command under the store's write lock and encodes the
//! response. Commands are normally delivered by the control thread
//! started with [`ControlPlane::spawn()`].

use super::datapath::POLL_INTERVAL;
use super::resource::SharedStore;
use crate::provider::LogLevel;
use crate::provider::Providers;
use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use pof_api::API_VERSION;
use pof_api::AddPortReq;
use pof_api::AddTableReq;
use pof_api::CmdHeader;
use pof_api::CmdOk;
use pof_api::CounterReq;
use pof_api::CounterResp;
use pof_api::DelEntryReq;
use pof_api::DelGroupReq;
use pof_api::DelMeterReq;
use pof_api::DelTableReq;
use pof_api::DumpCountersResp;
use pof_api::DumpGroupsResp;
use pof_api::DumpMetersResp;
use pof_api::DumpTablesResp;
use pof_api::EnablePortReq;
use pof_api::EntryReq;
use pof_api::GroupReq;
use pof_api::ListPortsResp;
use pof_api::MeterReq;
use pof_api::NoResp;
use pof_api::PofCmd;
use pof_api::PofError;
use pof_api::ResourceReport;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;

type Result<T> = core::result::Result<T, PofError>;

/// One admin command in flight to the control thread.
#[derive(Debug)]
pub struct CtlRequest {
    pub hdr: CmdHeader,
    pub req: Vec<u8>,
    pub reply: Sender<Result<Vec<u8>>>,
}

/// A request body, still encoded.
struct CmdEnvelope<'a> {
    req: &'a [u8],
}

impl CmdEnvelope<'_> {
    fn copy_in_req<T: DeserializeOwned>(&self) -> Result<T> {
        postcard::from_bytes(self.req)
            .map_err(|e| PofError::DeserCmdReq(format!("{e}")))
    }
}

fn hdlr_resp<T: CmdOk>(resp: Result<T>) -> Result<Vec<u8>> {
    let resp = resp?;
    postcard::to_allocvec(&resp)
        .map_err(|e| PofError::SerCmdResp(format!("{e}")))
}

/// Apply one admin command. This is the entry point for all commands.
/// It verifies the API version and then multiplexes the command to
/// its handler.
pub fn handle_cmd(
    store: &SharedStore,
    hdr: CmdHeader,
    req: &[u8],
) -> Result<Vec<u8>> {
    if !hdr.check_version() {
        return Err(PofError::BadApiVersion {
            user: hdr.api_version,
            switch: API_VERSION,
        });
    }

    let env = CmdEnvelope { req };

    match hdr.cmd {
        PofCmd::AddTable => hdlr_resp(add_table_hdlr(store, &env)),
        PofCmd::DelTable => hdlr_resp(del_table_hdlr(store, &env)),
        PofCmd::AddEntry => hdlr_resp(add_entry_hdlr(store, &env)),
        PofCmd::ModEntry => hdlr_resp(mod_entry_hdlr(store, &env)),
        PofCmd::DelEntry => hdlr_resp(del_entry_hdlr(store, &env)),
        PofCmd::AddGroup => hdlr_resp(add_group_hdlr(store, &env)),
        PofCmd::ModGroup => hdlr_resp(mod_group_hdlr(store, &env)),
        PofCmd::DelGroup => hdlr_resp(del_group_hdlr(store, &env)),
        PofCmd::AddMeter => hdlr_resp(add_meter_hdlr(store, &env)),
        PofCmd::ModMeter => hdlr_resp(mod_meter_hdlr(store, &env)),
        PofCmd::DelMeter => hdlr_resp(del_meter_hdlr(store, &env)),
        PofCmd::GetCounter => hdlr_resp(get_counter_hdlr(store, &env)),
        PofCmd::ClearCounter => hdlr_resp(clear_counter_hdlr(store, &env)),
        PofCmd::AddPort => hdlr_resp(add_port_hdlr(store, &env)),
        PofCmd::EnablePort => hdlr_resp(enable_port_hdlr(store, &env)),
        PofCmd::ListPorts => hdlr_resp(list_ports_hdlr(store)),
        PofCmd::DumpTables => hdlr_resp(dump_tables_hdlr(store)),
        PofCmd::DumpGroups => hdlr_resp(dump_groups_hdlr(store)),
        PofCmd::DumpMeters => hdlr_resp(dump_meters_hdlr(store)),
        PofCmd::DumpCounters => hdlr_resp(dump_counters_hdlr(store)),
        PofCmd::ResourceReport => hdlr_resp(resource_report_hdlr(store)),
        PofCmd::ClearResources => {
            store.write().clear();
            hdlr_resp(Ok(NoResp::default()))
        }
    }
}

fn add_table_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: AddTableReq = env.copy_in_req()?;
    store.write().create_flow_table(req.desc)?;
    Ok(NoResp::default())
}

fn del_table_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: DelTableReq = env.copy_in_req()?;
    store.write().delete_flow_table(req.table_type, req.table_id)?;
    Ok(NoResp::default())
}

fn add_entry_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: EntryReq = env.copy_in_req()?;
    store.write().add_flow_entry(req.entry)?;
    Ok(NoResp::default())
}

fn mod_entry_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: EntryReq = env.copy_in_req()?;
    store.write().modify_flow_entry(req.entry)?;
    Ok(NoResp::default())
}

fn del_entry_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: DelEntryReq = env.copy_in_req()?;
    store
        .write()
        .delete_flow_entry(req.table_type, req.table_id, req.index)?;
    Ok(NoResp::default())
}

fn add_group_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: GroupReq = env.copy_in_req()?;
    store.write().add_group(req.group)?;
    Ok(NoResp::default())
}

fn mod_group_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: GroupReq = env.copy_in_req()?;
    store.write().modify_group(req.group)?;
    Ok(NoResp::default())
}

fn del_group_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: DelGroupReq = env.copy_in_req()?;
    store.write().delete_group(req.group_id)?;
    Ok(NoResp::default())
}

fn add_meter_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: MeterReq = env.copy_in_req()?;
    store.write().add_meter(req.meter)?;
    Ok(NoResp::default())
}

fn mod_meter_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: MeterReq = env.copy_in_req()?;
    store.write().modify_meter(req.meter)?;
    Ok(NoResp::default())
}

fn del_meter_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: DelMeterReq = env.copy_in_req()?;
    store.write().delete_meter(req.meter_id)?;
    Ok(NoResp::default())
}

fn get_counter_hdlr(
    store: &SharedStore,
    env: &CmdEnvelope,
) -> Result<CounterResp> {
    let req: CounterReq = env.copy_in_req()?;
    let value = store.read().counter_get(req.counter_id)?;
    Ok(CounterResp { counter_id: req.counter_id, value })
}

fn clear_counter_hdlr(
    store: &SharedStore,
    env: &CmdEnvelope,
) -> Result<NoResp> {
    let req: CounterReq = env.copy_in_req()?;
    // Counters are atomics; the read lock is enough.
    store.read().counter_clear(req.counter_id)?;
    Ok(NoResp::default())
}

fn add_port_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: AddPortReq = env.copy_in_req()?;
    store.write().add_port(req.port)?;
    Ok(NoResp::default())
}

fn enable_port_hdlr(store: &SharedStore, env: &CmdEnvelope) -> Result<NoResp> {
    let req: EnablePortReq = env.copy_in_req()?;
    store.write().port_enable(req.port_id, req.enable)?;
    Ok(NoResp::default())
}

fn list_ports_hdlr(store: &SharedStore) -> Result<ListPortsResp> {
    let ports = store.read().ports().iter().cloned().collect();
    Ok(ListPortsResp { ports })
}

fn dump_tables_hdlr(store: &SharedStore) -> Result<DumpTablesResp> {
    Ok(store.read().dump_tables())
}

fn dump_groups_hdlr(store: &SharedStore) -> Result<DumpGroupsResp> {
    Ok(store.read().dump_groups())
}

fn dump_meters_hdlr(store: &SharedStore) -> Result<DumpMetersResp> {
    Ok(store.read().dump_meters())
}

fn dump_counters_hdlr(store: &SharedStore) -> Result<DumpCountersResp> {
    Ok(store.read().dump_counters())
}

fn resource_report_hdlr(store: &SharedStore) -> Result<ResourceReport> {
    Ok(store.read().resource_report())
}

/// The control thread.
pub struct ControlPlane {
    tx: Option<Sender<CtlRequest>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ControlPlane {
    /// Start the control thread. When `auto_clear` is set, the store
    /// is cleared once every sender for the thread has gone away.
    pub fn spawn(
        store: SharedStore,
        providers: Providers,
        auto_clear: bool,
    ) -> Result<Self> {
        let (tx, rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(true));
        let thr_running = running.clone();
        let handle = thread::Builder::new()
            .name("pof-ctl".to_string())
            .spawn(move || {
                serve(store, providers, rx, thr_running, auto_clear)
            })
            .map_err(|_| PofError::AllocationFailure)?;

        Ok(Self { tx: Some(tx), running, handle: Some(handle) })
    }

    /// A sender for submitting commands, until the control plane is
    /// disconnected.
    pub fn sender(&self) -> Option<Sender<CtlRequest>> {
        self.tx.clone()
    }

    /// Drop our own sender and wait for the thread to see the channel
    /// close, which happens once every other sender is gone too.
    pub fn disconnect(&mut self) {
        self.tx = None;
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    /// Stop the thread now, whoever still holds a sender.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.tx = None;
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for ControlPlane {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(
    store: SharedStore,
    providers: Providers,
    rx: Receiver<CtlRequest>,
    running: Arc<AtomicBool>,
    auto_clear: bool,
) {
    while running.load(Ordering::Relaxed) {
        let req = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(req) => req,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                if auto_clear {
                    providers.log.log(
                        LogLevel::Note,
                        "control channel closed, clearing resources",
                    );
                    store.write().clear();
                }
                break;
            }
        };

        let res = handle_cmd(&store, req.hdr, &req.req);
        if let Err(e) = &res {
            providers.log.log(
                LogLevel::Warn,
                &format!("{:?} failed: {e} (xid {})", req.hdr.cmd, req.hdr.xid),
            );
        }
        // The requester may have given up waiting.
        let _ = req.reply.send(res);
    }
}
