// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use crossbeam_channel::Sender;
use crossbeam_channel::bounded;
use pof::api::AddPortReq;
use pof::api::AddTableReq;
use pof::api::CmdHeader;
use pof::api::CmdOk;
use pof::api::CounterReq;
use pof::api::CounterResp;
use pof::api::DelEntryReq;
use pof::api::DelGroupReq;
use pof::api::DelMeterReq;
use pof::api::DelTableReq;
use pof::api::DumpCountersResp;
use pof::api::DumpGroupsResp;
use pof::api::DumpMetersResp;
use pof::api::DumpTablesResp;
use pof::api::EnablePortReq;
use pof::api::EntryReq;
use pof::api::FlowEntry;
use pof::api::FlowTableDesc;
use pof::api::Group;
use pof::api::GroupReq;
use pof::api::ListPortsResp;
use pof::api::Meter;
use pof::api::MeterReq;
use pof::api::NoResp;
use pof::api::PofCmd;
pub use pof::api::PofError;
use pof::api::PortDesc;
use pof::api::ResourceReport;
use pof::api::TableType;
use pof::engine::ctl::ControlPlane;
use pof::engine::ctl::CtlRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use thiserror::Error;

/// Errors related to administering the switch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("control plane is not running")]
    NotRunning,

    /// The control thread went away before answering.
    #[error("control channel disconnected during {0:?}")]
    Disconnected(PofCmd),

    #[error("request serialization failed for command {0:?}: {1}")]
    ReqSer(PofCmd, postcard::Error),

    #[error("response deserialization failed for command {0:?}: {1}")]
    RespDeser(PofCmd, postcard::Error),

    #[error("API version mismatch: client {user}, switch {switch}")]
    BadApiVersion { user: u64, switch: u64 },

    #[error("command {0:?} failed: {1}")]
    CommandError(PofCmd, PofError),
}

impl Error {
    fn from_cmd(cmd: PofCmd, e: PofError) -> Self {
        match e {
            PofError::BadApiVersion { user, switch } => {
                Self::BadApiVersion { user, switch }
            }
            e => Self::CommandError(cmd, e),
        }
    }

    /// The switch's own error, if the command reached it and failed.
    pub fn pof_error(&self) -> Option<&PofError> {
        match self {
            Self::CommandError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// The handle used to send administration commands to the switch.
#[derive(Debug)]
pub struct CtlHdl {
    tx: Sender<CtlRequest>,
    xid: AtomicU32,
}

impl CtlHdl {
    /// Create a new handle on a running control plane.
    pub fn open(ctl: &ControlPlane) -> Result<Self, Error> {
        let tx = ctl.sender().ok_or(Error::NotRunning)?;
        Ok(Self::from_sender(tx))
    }

    /// Create a new handle on an arbitrary command channel.
    pub fn from_sender(tx: Sender<CtlRequest>) -> Self {
        Self { tx, xid: AtomicU32::new(1) }
    }

    /// Create a flow table.
    pub fn add_table(&self, desc: FlowTableDesc) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::AddTable, Some(&AddTableReq { desc }))
    }

    /// Delete an empty flow table.
    pub fn del_table(
        &self,
        table_type: TableType,
        table_id: u8,
    ) -> Result<NoResp, Error> {
        let req = DelTableReq { table_type, table_id };
        self.run_cmd(PofCmd::DelTable, Some(&req))
    }

    /// Add a flow entry.
    pub fn add_entry(&self, entry: FlowEntry) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::AddEntry, Some(&EntryReq { entry }))
    }

    /// Replace the flow entry in the slot named by `entry`.
    pub fn mod_entry(&self, entry: FlowEntry) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::ModEntry, Some(&EntryReq { entry }))
    }

    pub fn del_entry(
        &self,
        table_type: TableType,
        table_id: u8,
        index: u32,
    ) -> Result<NoResp, Error> {
        let req = DelEntryReq { table_type, table_id, index };
        self.run_cmd(PofCmd::DelEntry, Some(&req))
    }

    pub fn add_group(&self, group: Group) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::AddGroup, Some(&GroupReq { group }))
    }

    pub fn mod_group(&self, group: Group) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::ModGroup, Some(&GroupReq { group }))
    }

    pub fn del_group(&self, group_id: u32) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::DelGroup, Some(&DelGroupReq { group_id }))
    }

    pub fn add_meter(&self, meter: Meter) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::AddMeter, Some(&MeterReq { meter }))
    }

    pub fn mod_meter(&self, meter: Meter) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::ModMeter, Some(&MeterReq { meter }))
    }

    pub fn del_meter(&self, meter_id: u32) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::DelMeter, Some(&DelMeterReq { meter_id }))
    }

    /// Read a counter.
    pub fn get_counter(&self, counter_id: u32) -> Result<CounterResp, Error> {
        self.run_cmd(PofCmd::GetCounter, Some(&CounterReq { counter_id }))
    }

    /// Reset a counter to zero.
    pub fn clear_counter(&self, counter_id: u32) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::ClearCounter, Some(&CounterReq { counter_id }))
    }

    pub fn add_port(&self, port: PortDesc) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::AddPort, Some(&AddPortReq { port }))
    }

    /// Enable or disable forwarding on a port.
    pub fn enable_port(
        &self,
        port_id: u32,
        enable: bool,
    ) -> Result<NoResp, Error> {
        let req = EnablePortReq { port_id, enable };
        self.run_cmd(PofCmd::EnablePort, Some(&req))
    }

    /// List the registered ports.
    pub fn list_ports(&self) -> Result<ListPortsResp, Error> {
        self.run_cmd(PofCmd::ListPorts, None::<&()>)
    }

    /// Return every flow table along with its entries.
    pub fn dump_tables(&self) -> Result<DumpTablesResp, Error> {
        self.run_cmd(PofCmd::DumpTables, None::<&()>)
    }

    pub fn dump_groups(&self) -> Result<DumpGroupsResp, Error> {
        self.run_cmd(PofCmd::DumpGroups, None::<&()>)
    }

    pub fn dump_meters(&self) -> Result<DumpMetersResp, Error> {
        self.run_cmd(PofCmd::DumpMeters, None::<&()>)
    }

    pub fn dump_counters(&self) -> Result<DumpCountersResp, Error> {
        self.run_cmd(PofCmd::DumpCounters, None::<&()>)
    }

    /// Return the configured capacities of the switch.
    pub fn resource_report(&self) -> Result<ResourceReport, Error> {
        self.run_cmd(PofCmd::ResourceReport, None::<&()>)
    }

    /// Disable every port and drop all tables, groups, meters and
    /// counters.
    pub fn clear_resources(&self) -> Result<NoResp, Error> {
        self.run_cmd(PofCmd::ClearResources, None::<&()>)
    }

    fn run_cmd<T, R>(&self, cmd: PofCmd, req: Option<&R>) -> Result<T, Error>
    where
        T: CmdOk + DeserializeOwned,
        R: Serialize,
    {
        let req = match req {
            Some(req) => postcard::to_allocvec(req)
                .map_err(|e| Error::ReqSer(cmd, e))?,
            None => vec![],
        };

        let xid = self.xid.fetch_add(1, Ordering::Relaxed);
        let (reply, resp_rx) = bounded(1);
        self.tx
            .send(CtlRequest { hdr: CmdHeader::new(cmd, xid), req, reply })
            .map_err(|_| Error::Disconnected(cmd))?;

        let resp = resp_rx
            .recv()
            .map_err(|_| Error::Disconnected(cmd))?
            .map_err(|e| Error::from_cmd(cmd, e))?;
        postcard::from_bytes(&resp).map_err(|e| Error::RespDeser(cmd, e))
    }
}
