// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use super::API_VERSION;
use super::FlowEntry;
use super::FlowTableDesc;
use super::Group;
use super::Meter;
use super::PortDesc;
use super::TableType;
use super::error::ErrorMsg;
use alloc::vec::Vec;
use core::fmt::Debug;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u16)]
pub enum PofCmd {
    AddTable = 1,        // create a flow table
    DelTable = 2,        // delete an empty flow table
    AddEntry = 10,       // add a flow entry
    ModEntry = 11,       // replace a flow entry
    DelEntry = 12,       // delete a flow entry
    AddGroup = 20,       // add a group
    ModGroup = 21,       // replace a group's actions
    DelGroup = 22,       // delete a group
    AddMeter = 30,       // add a meter
    ModMeter = 31,       // change a meter's rate
    DelMeter = 32,       // delete a meter
    GetCounter = 40,     // read a counter
    ClearCounter = 41,   // reset a counter to zero
    AddPort = 50,        // register a port
    EnablePort = 51,     // enable/disable forwarding on a port
    ListPorts = 52,      // list all ports
    DumpTables = 60,     // dump all flow tables and entries
    DumpGroups = 61,     // dump all groups
    DumpMeters = 62,     // dump all meters
    DumpCounters = 63,   // dump all valid counters
    ResourceReport = 64, // describe the configured capacities
    ClearResources = 70, // disable ports, drop all resources
}

impl TryFrom<u16> for PofCmd {
    type Error = ();

    fn try_from(num: u16) -> Result<Self, Self::Error> {
        match num {
            1 => Ok(Self::AddTable),
            2 => Ok(Self::DelTable),
            10 => Ok(Self::AddEntry),
            11 => Ok(Self::ModEntry),
            12 => Ok(Self::DelEntry),
            20 => Ok(Self::AddGroup),
            21 => Ok(Self::ModGroup),
            22 => Ok(Self::DelGroup),
            30 => Ok(Self::AddMeter),
            31 => Ok(Self::ModMeter),
            32 => Ok(Self::DelMeter),
            40 => Ok(Self::GetCounter),
            41 => Ok(Self::ClearCounter),
            50 => Ok(Self::AddPort),
            51 => Ok(Self::EnablePort),
            52 => Ok(Self::ListPorts),
            60 => Ok(Self::DumpTables),
            61 => Ok(Self::DumpGroups),
            62 => Ok(Self::DumpMeters),
            63 => Ok(Self::DumpCounters),
            64 => Ok(Self::ResourceReport),
            70 => Ok(Self::ClearResources),
            _ => Err(()),
        }
    }
}

/// The fixed part of every admin request. The command's request body
/// travels alongside it, postcard-encoded.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CmdHeader {
    pub api_version: u64,
    pub cmd: PofCmd,
    pub xid: u32,
}

impl CmdHeader {
    pub fn new(cmd: PofCmd, xid: u32) -> Self {
        Self { api_version: API_VERSION, cmd, xid }
    }

    /// Is this the expected API version?
    ///
    /// As long as `API_VERSION` is bumped with every API change, this
    /// returns `false` when client and switch were built from
    /// different API definitions.
    pub fn check_version(&self) -> bool {
        self.api_version == API_VERSION
    }
}

/// A marker trait indicating a success response type that is returned
/// from a command and may be passed across the admin channel.
pub trait CmdOk: Debug + Serialize {}

impl CmdOk for () {}

/// Indicates no meaningful response value on success.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

impl CmdOk for NoResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddTableReq {
    pub desc: FlowTableDesc,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DelTableReq {
    pub table_type: TableType,
    pub table_id: u8,
}

/// Used by both [`PofCmd::AddEntry`] and [`PofCmd::ModEntry`].
#[derive(Debug, Deserialize, Serialize)]
pub struct EntryReq {
    pub entry: FlowEntry,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DelEntryReq {
    pub table_type: TableType,
    pub table_id: u8,
    pub index: u32,
}

/// Used by both [`PofCmd::AddGroup`] and [`PofCmd::ModGroup`].
#[derive(Debug, Deserialize, Serialize)]
pub struct GroupReq {
    pub group: Group,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DelGroupReq {
    pub group_id: u32,
}

/// Used by both [`PofCmd::AddMeter`] and [`PofCmd::ModMeter`].
#[derive(Debug, Deserialize, Serialize)]
pub struct MeterReq {
    pub meter: Meter,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DelMeterReq {
    pub meter_id: u32,
}

/// Used by both [`PofCmd::GetCounter`] and [`PofCmd::ClearCounter`].
#[derive(Debug, Deserialize, Serialize)]
pub struct CounterReq {
    pub counter_id: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CounterResp {
    pub counter_id: u32,
    pub value: u64,
}

impl CmdOk for CounterResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct AddPortReq {
    pub port: PortDesc,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EnablePortReq {
    pub port_id: u32,
    pub enable: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ListPortsResp {
    pub ports: Vec<PortDesc>,
}

impl CmdOk for ListPortsResp {}

/// A flow entry along with the value of its counter.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EntryDump {
    pub entry: FlowEntry,
    /// The value of the entry's counter, or zero when it has none.
    pub hits: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableDump {
    pub desc: FlowTableDesc,
    pub global_id: u8,
    pub entries: Vec<EntryDump>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DumpTablesResp {
    pub tables: Vec<TableDump>,
}

impl CmdOk for DumpTablesResp {}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupDump {
    pub group: Group,
    pub hits: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DumpGroupsResp {
    pub groups: Vec<GroupDump>,
}

impl CmdOk for DumpGroupsResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct DumpMetersResp {
    pub meters: Vec<Meter>,
}

impl CmdOk for DumpMetersResp {}

#[derive(Debug, Deserialize, Serialize)]
pub struct DumpCountersResp {
    pub counters: Vec<CounterResp>,
}

impl CmdOk for DumpCountersResp {}

/// The capacity of one table type.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableTypeReport {
    pub table_type: TableType,
    pub table_num: u8,
    pub size: u32,
    pub key_len: u16,
}

/// The configured capacities of the switch, as reported to the
/// controller when it connects.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceReport {
    pub device_id: u32,
    pub tables: Vec<TableTypeReport>,
    pub counter_num: u32,
    pub meter_num: u32,
    pub group_num: u32,
    pub port_num_max: u32,
}

impl CmdOk for ResourceReport {}

/// The lookup missed and the switch is configured to escalate misses.
pub const REASON_NO_MATCH: u8 = 0;

/// A PACKET_IN action fired.
pub const REASON_ACTION: u8 = 1;

/// A packet sent up to the controller.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub reason: u8,
    /// The global ID of the table the packet was in.
    pub table_id: u8,
    pub cookie: u64,
    pub device_id: u32,
    pub data: Vec<u8>,
}

/// Why a port-status message was sent.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum PortReason {
    Add = 0,
    Delete = 1,
    Modify = 2,
}

/// A port appeared, went away, or changed state.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortStatus {
    pub reason: PortReason,
    /// The port as it stands after the change, or as it was just
    /// before a delete.
    pub port: PortDesc,
}

/// Everything the data path sends towards the controller.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Upcall {
    PacketIn(PacketIn),
    PortStatus(PortStatus),
    Error(ErrorMsg),
}
