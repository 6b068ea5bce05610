// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The resource store: every table, entry, group, meter, counter and
//! port the controller has installed.
//!
//! Each resource kind is a fixed-capacity arena sized from
//! [`StoreCfg`] at startup. The store as a whole lives behind a
//! reader/writer lock ([`SharedStore`]). The control thread takes the
//! write lock to apply an administrative command; the forwarding
//! thread holds the read lock while it runs one packet. Counters are
//! atomics so that the forwarding thread can bump them without the
//! write lock.
//!
//! Every administrative operation validates its whole request before
//! it mutates anything. A command that fails leaves the store exactly
//! as it was.

use super::flow_table::FlowTable;
use super::lookup::check_match_len;
use super::port::PortTable;
use parking_lot::RwLock;
use pof_api::CounterResp;
use pof_api::DumpCountersResp;
use pof_api::DumpGroupsResp;
use pof_api::DumpMetersResp;
use pof_api::DumpTablesResp;
use pof_api::EntryDump;
use pof_api::FIRST_TABLE_ID;
use pof_api::FlowEntry;
use pof_api::FlowTableDesc;
use pof_api::Group;
use pof_api::GroupDump;
use pof_api::MAX_MATCH_FIELD_NUM;
use pof_api::Meter;
use pof_api::PofError;
use pof_api::PortDesc;
use pof_api::ResourceReport;
use pof_api::TableDump;
use pof_api::TableType;
use pof_api::TableTypeReport;
use pof_api::defaults;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

type Result<T> = core::result::Result<T, PofError>;

/// The store shared by the control and forwarding threads.
pub type SharedStore = Arc<RwLock<ResourceStore>>;

/// Resource limits.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreCfg {
    pub device_id: u32,
    /// The number of tables of each type, indexed by `TableType`.
    pub table_num: [u8; 4],
    /// The maximum size of any table.
    pub table_size: u32,
    /// The maximum key length of any table, in bits.
    pub key_len: u16,
    pub meter_num: u32,
    pub counter_num: u32,
    pub group_num: u32,
    pub port_num_max: u32,
    /// Reject entries that duplicate an installed entry's priority
    /// and key. Linear tables are never checked.
    pub dup_entry_check: bool,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            device_id: 0,
            table_num: [
                defaults::MM_TABLE_NUM,
                defaults::LPM_TABLE_NUM,
                defaults::EM_TABLE_NUM,
                defaults::LINEAR_TABLE_NUM,
            ],
            table_size: defaults::FLOW_TABLE_SIZE,
            key_len: defaults::FLOW_TABLE_KEY_LEN,
            meter_num: defaults::METER_NUM,
            counter_num: defaults::COUNTER_NUM,
            group_num: defaults::GROUP_NUM,
            port_num_max: defaults::PORT_NUM_MAX,
            dup_entry_check: false,
        }
    }
}

impl StoreCfg {
    pub fn table_num(&self, table_type: TableType) -> u8 {
        self.table_num[table_type.idx()]
    }

    /// The first global ID of each table type.
    fn table_base(&self, table_type: TableType) -> u16 {
        self.table_num[..table_type.idx()].iter().map(|&n| n as u16).sum()
    }
}

#[derive(Debug, Default)]
struct Counter {
    valid: AtomicBool,
    value: AtomicU64,
}

#[derive(Debug)]
pub struct ResourceStore {
    cfg: StoreCfg,
    tables: [Vec<Option<FlowTable>>; 4],
    groups: Vec<Option<Group>>,
    meters: Vec<Option<Meter>>,
    counters: Vec<Counter>,
    ports: PortTable,
}

impl ResourceStore {
    pub fn new(cfg: StoreCfg) -> Self {
        let tables = TableType::ALL.map(|tt| {
            (0..cfg.table_num(tt)).map(|_| None).collect::<Vec<_>>()
        });
        let groups = vec![None; cfg.group_num as usize];
        let meters = vec![None; cfg.meter_num as usize];
        let counters =
            (0..cfg.counter_num).map(|_| Counter::default()).collect();
        let ports = PortTable::new(cfg.port_num_max);

        Self { cfg, tables, groups, meters, counters, ports }
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn cfg(&self) -> &StoreCfg {
        &self.cfg
    }

    // ================================================================
    // Table IDs
    // ================================================================

    /// Convert a `(type, id)` pair to the single-byte ID used by
    /// GOTO instructions and upcalls.
    pub fn table_id_to_global(
        &self,
        table_type: TableType,
        table_id: u8,
    ) -> Result<u8> {
        self.check_table_id(table_type, table_id)?;
        let global = self.cfg.table_base(table_type) + table_id as u16;
        u8::try_from(global).map_err(|_| PofError::BadTableId(table_id))
    }

    pub fn global_to_table_id(&self, global: u8) -> Result<(TableType, u8)> {
        for tt in TableType::ALL {
            let base = self.cfg.table_base(tt);
            let num = self.cfg.table_num(tt) as u16;
            if (global as u16) < base + num {
                return Ok((tt, (global as u16 - base) as u8));
            }
        }

        Err(PofError::BadTableId(global))
    }

    fn check_table_id(&self, table_type: TableType, table_id: u8) -> Result<()> {
        if table_id >= self.cfg.table_num(table_type) {
            return Err(PofError::BadTableId(table_id));
        }
        Ok(())
    }

    // ================================================================
    // Flow tables
    // ================================================================

    /// Fetch a created table.
    ///
    /// # Errors
    ///
    /// `BadTableId` if the ID is outside the range configured for its
    /// type, `TableUnexist` if it has not been created.
    pub fn flow_table(
        &self,
        table_type: TableType,
        table_id: u8,
    ) -> Result<&FlowTable> {
        self.check_table_id(table_type, table_id)?;
        self.tables[table_type.idx()][table_id as usize]
            .as_ref()
            .ok_or(PofError::TableUnexist(table_type, table_id))
    }

    fn flow_table_mut(
        &mut self,
        table_type: TableType,
        table_id: u8,
    ) -> Result<&mut FlowTable> {
        self.check_table_id(table_type, table_id)?;
        self.tables[table_type.idx()][table_id as usize]
            .as_mut()
            .ok_or(PofError::TableUnexist(table_type, table_id))
    }

    /// Does the table every packet starts in exist?
    pub fn first_table_exists(&self) -> bool {
        self.global_to_table_id(FIRST_TABLE_ID)
            .and_then(|(tt, id)| self.flow_table(tt, id))
            .is_ok()
    }

    /// Iterate all created tables in global ID order.
    pub fn iter_tables(&self) -> impl Iterator<Item = &FlowTable> {
        self.tables.iter().flat_map(|ts| ts.iter().flatten())
    }

    pub fn create_flow_table(&mut self, desc: FlowTableDesc) -> Result<()> {
        let (tt, id) = (desc.table_type, desc.table_id);
        self.check_table_id(tt, id)?;

        if self.tables[tt.idx()][id as usize].is_some() {
            return Err(PofError::TableExist(tt, id));
        }

        if desc.size == 0 || desc.size > self.cfg.table_size {
            return Err(PofError::BadTableSize(desc.size));
        }

        if desc.key_len > self.cfg.key_len
            || desc.match_fields.len() > MAX_MATCH_FIELD_NUM
        {
            return Err(PofError::BadKeyLen(desc.key_len));
        }

        for field in &desc.match_fields {
            check_match_len(field)?;
        }

        self.tables[tt.idx()][id as usize] = Some(FlowTable::new(desc));
        Ok(())
    }

    pub fn delete_flow_table(
        &mut self,
        table_type: TableType,
        table_id: u8,
    ) -> Result<()> {
        let table = self.flow_table(table_type, table_id)?;
        if !table.is_empty() {
            return Err(PofError::TableUnempty(table_type, table_id));
        }

        self.tables[table_type.idx()][table_id as usize] = None;
        Ok(())
    }

    fn check_entry(&self, table: &FlowTable, entry: &FlowEntry) -> Result<()> {
        if entry.index >= table.desc().size {
            return Err(PofError::BadEntryId(entry.index));
        }

        if entry.matches.len() > table.desc().match_fields.len() {
            return Err(PofError::BadMatchLength(entry.matches.len() as u16));
        }

        for mx in &entry.matches {
            check_match_len(&mx.field)?;
        }

        self.check_counter_id(entry.counter_id)
    }

    pub fn add_flow_entry(&mut self, entry: FlowEntry) -> Result<()> {
        let table = self.flow_table(entry.table_type, entry.table_id)?;
        self.check_entry(table, &entry)?;

        if table.entry(entry.index).is_ok() {
            return Err(PofError::EntryExist(entry.index));
        }

        if self.cfg.dup_entry_check && entry.table_type != TableType::Linear {
            if let Some(idx) = table.find_duplicate(&entry) {
                return Err(PofError::EntryExist(idx));
            }
        }

        self.counter_init(entry.counter_id)?;
        self.flow_table_mut(entry.table_type, entry.table_id)?.insert(entry)
    }

    pub fn modify_flow_entry(&mut self, entry: FlowEntry) -> Result<()> {
        let table = self.flow_table(entry.table_type, entry.table_id)?;
        self.check_entry(table, &entry)?;
        let old = table.entry(entry.index)?;

        if self.cfg.dup_entry_check && entry.table_type != TableType::Linear {
            if let Some(idx) = table.find_duplicate(&entry) {
                if idx != entry.index {
                    return Err(PofError::EntryExist(idx));
                }
            }
        }

        let old_counter = old.counter_id;
        let counter_moved = old_counter != entry.counter_id;
        if counter_moved {
            self.counter_init(entry.counter_id)?;
        }

        self.flow_table_mut(entry.table_type, entry.table_id)?
            .replace(entry)?;

        if counter_moved && !self.counter_in_use(old_counter) {
            match self.counter_delete(old_counter) {
                Ok(()) | Err(PofError::UnknownCounter(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn delete_flow_entry(
        &mut self,
        table_type: TableType,
        table_id: u8,
        index: u32,
    ) -> Result<()> {
        let counter_id =
            self.flow_table(table_type, table_id)?.entry(index)?.counter_id;

        // Entries may share a counter; only the first delete of a
        // shared counter finds it valid.
        match self.counter_delete(counter_id) {
            Ok(()) | Err(PofError::UnknownCounter(_)) => {}
            Err(e) => return Err(e),
        }

        self.flow_table_mut(table_type, table_id)?.remove(index).map(|_| ())
    }

    /// Fetch an entry by slot, as GOTO_DIRECT_TABLE does.
    pub fn entry(
        &self,
        table_type: TableType,
        table_id: u8,
        index: u32,
    ) -> Result<&Arc<FlowEntry>> {
        self.flow_table(table_type, table_id)?.entry(index)
    }

    // ================================================================
    // Groups
    // ================================================================

    pub fn group(&self, group_id: u32) -> Result<&Group> {
        self.groups
            .get(group_id as usize)
            .and_then(Option::as_ref)
            .ok_or(PofError::UnknownGroup(group_id))
    }

    fn group_slot(&self, group_id: u32) -> Result<&Option<Group>> {
        self.groups
            .get(group_id as usize)
            .ok_or(PofError::InvalidGroup(group_id))
    }

    pub fn add_group(&mut self, group: Group) -> Result<()> {
        if self.group_slot(group.group_id)?.is_some() {
            return Err(PofError::GroupExist(group.group_id));
        }

        self.check_counter_id(group.counter_id)?;
        self.counter_init(group.counter_id)?;
        let id = group.group_id as usize;
        self.groups[id] = Some(group);
        Ok(())
    }

    pub fn modify_group(&mut self, group: Group) -> Result<()> {
        let old = self
            .group_slot(group.group_id)?
            .as_ref()
            .ok_or(PofError::UnknownGroup(group.group_id))?;

        if old.counter_id != group.counter_id {
            return Err(PofError::BadCounterId(group.counter_id));
        }

        let id = group.group_id as usize;
        self.groups[id] = Some(group);
        Ok(())
    }

    pub fn delete_group(&mut self, group_id: u32) -> Result<()> {
        let counter_id = self
            .group_slot(group_id)?
            .as_ref()
            .ok_or(PofError::UnknownGroup(group_id))?
            .counter_id;

        match self.counter_delete(counter_id) {
            Ok(()) | Err(PofError::UnknownCounter(_)) => {}
            Err(e) => return Err(e),
        }

        self.groups[group_id as usize] = None;
        Ok(())
    }

    pub fn iter_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().flatten()
    }

    // ================================================================
    // Meters
    // ================================================================

    pub fn meter(&self, meter_id: u32) -> Result<&Meter> {
        self.meters
            .get(meter_id as usize)
            .and_then(Option::as_ref)
            .ok_or(PofError::UnknownMeter(meter_id))
    }

    fn meter_slot_mut(&mut self, meter_id: u32) -> Result<&mut Option<Meter>> {
        self.meters
            .get_mut(meter_id as usize)
            .ok_or(PofError::InvalidMeter(meter_id))
    }

    pub fn add_meter(&mut self, meter: Meter) -> Result<()> {
        let slot = self.meter_slot_mut(meter.meter_id)?;
        if slot.is_some() {
            return Err(PofError::MeterExist(meter.meter_id));
        }
        *slot = Some(meter);
        Ok(())
    }

    pub fn modify_meter(&mut self, meter: Meter) -> Result<()> {
        let slot = self.meter_slot_mut(meter.meter_id)?;
        match slot {
            Some(m) => {
                m.rate = meter.rate;
                Ok(())
            }
            None => Err(PofError::UnknownMeter(meter.meter_id)),
        }
    }

    pub fn delete_meter(&mut self, meter_id: u32) -> Result<()> {
        self.meter_slot_mut(meter_id)?
            .take()
            .map(|_| ())
            .ok_or(PofError::UnknownMeter(meter_id))
    }

    pub fn iter_meters(&self) -> impl Iterator<Item = &Meter> {
        self.meters.iter().flatten()
    }

    // ================================================================
    // Counters
    //
    // Counter 0 means "no counter". Every operation except
    // `counter_get()` accepts it and does nothing.
    // ================================================================

    fn check_counter_id(&self, counter_id: u32) -> Result<()> {
        if counter_id as usize >= self.counters.len() {
            return Err(PofError::BadCounterId(counter_id));
        }
        Ok(())
    }

    fn counter(&self, counter_id: u32) -> Result<Option<&Counter>> {
        if counter_id == 0 {
            return Ok(None);
        }
        self.check_counter_id(counter_id)?;
        Ok(Some(&self.counters[counter_id as usize]))
    }

    /// Whether any installed entry or group still points at the
    /// counter.
    fn counter_in_use(&self, counter_id: u32) -> bool {
        self.iter_tables()
            .flat_map(|t| t.iter())
            .any(|e| e.counter_id == counter_id)
            || self.iter_groups().any(|g| g.counter_id == counter_id)
    }

    /// Mark a counter valid, starting it at zero. A counter that is
    /// already valid keeps its value.
    pub fn counter_init(&self, counter_id: u32) -> Result<()> {
        if let Some(c) = self.counter(counter_id)? {
            if !c.valid.swap(true, Ordering::Relaxed) {
                c.value.store(0, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn counter_delete(&self, counter_id: u32) -> Result<()> {
        if let Some(c) = self.counter(counter_id)? {
            if !c.valid.swap(false, Ordering::Relaxed) {
                return Err(PofError::UnknownCounter(counter_id));
            }
            c.value.store(0, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn counter_clear(&self, counter_id: u32) -> Result<()> {
        if let Some(c) = self.counter(counter_id)? {
            if !c.valid.load(Ordering::Relaxed) {
                return Err(PofError::UnknownCounter(counter_id));
            }
            c.value.store(0, Ordering::Relaxed);
        }
        Ok(())
    }

    pub fn counter_get(&self, counter_id: u32) -> Result<u64> {
        let c = self
            .counter(counter_id)?
            .ok_or(PofError::BadCounterId(counter_id))?;
        if !c.valid.load(Ordering::Relaxed) {
            return Err(PofError::UnknownCounter(counter_id));
        }
        Ok(c.value.load(Ordering::Relaxed))
    }

    /// Bump a counter from the data path, bringing it to life on
    /// first use.
    pub fn counter_increment(&self, counter_id: u32) -> Result<()> {
        if let Some(c) = self.counter(counter_id)? {
            if !c.valid.swap(true, Ordering::Relaxed) {
                c.value.store(0, Ordering::Relaxed);
            }
            c.value.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// The value of a counter, or zero when it is absent.
    fn hits(&self, counter_id: u32) -> u64 {
        self.counter_get(counter_id).unwrap_or(0)
    }

    // ================================================================
    // Ports
    // ================================================================

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    pub fn add_port(&mut self, desc: PortDesc) -> Result<()> {
        self.ports.add(desc)
    }

    pub fn remove_port(&mut self, port_id: u32) -> Result<PortDesc> {
        self.ports.remove(port_id)
    }

    /// Returns the port as it now stands.
    pub fn port_enable(
        &mut self,
        port_id: u32,
        enable: bool,
    ) -> Result<PortDesc> {
        self.ports.enable(port_id, enable).cloned()
    }

    pub fn check_port_index(&self, port_id: u32) -> Result<&PortDesc> {
        self.ports.check_port_index(port_id)
    }

    // ================================================================
    // Whole-store operations
    // ================================================================

    /// Disable every port and drop every table, group, meter and
    /// counter. Ports stay registered.
    pub fn clear(&mut self) {
        self.ports.disable_all();
        for ts in self.tables.iter_mut() {
            ts.iter_mut().for_each(|t| *t = None);
        }
        self.groups.iter_mut().for_each(|g| *g = None);
        self.meters.iter_mut().for_each(|m| *m = None);
        for c in &self.counters {
            c.valid.store(false, Ordering::Relaxed);
            c.value.store(0, Ordering::Relaxed);
        }
    }

    pub fn resource_report(&self) -> ResourceReport {
        let tables = TableType::ALL
            .iter()
            .map(|&tt| TableTypeReport {
                table_type: tt,
                table_num: self.cfg.table_num(tt),
                size: self.cfg.table_size,
                key_len: self.cfg.key_len,
            })
            .collect();

        ResourceReport {
            device_id: self.cfg.device_id,
            tables,
            counter_num: self.cfg.counter_num,
            meter_num: self.cfg.meter_num,
            group_num: self.cfg.group_num,
            port_num_max: self.cfg.port_num_max,
        }
    }

    pub fn dump_tables(&self) -> DumpTablesResp {
        let mut tables = vec![];

        for table in self.iter_tables() {
            let desc = table.desc();
            let global_id = self
                .table_id_to_global(desc.table_type, desc.table_id)
                .unwrap_or(u8::MAX);
            let entries = table
                .iter()
                .map(|e| EntryDump {
                    entry: FlowEntry::clone(e),
                    hits: self.hits(e.counter_id),
                })
                .collect();
            tables.push(TableDump { desc: desc.clone(), global_id, entries });
        }

        DumpTablesResp { tables }
    }

    pub fn dump_groups(&self) -> DumpGroupsResp {
        let groups = self
            .iter_groups()
            .map(|g| GroupDump { group: g.clone(), hits: self.hits(g.counter_id) })
            .collect();
        DumpGroupsResp { groups }
    }

    pub fn dump_meters(&self) -> DumpMetersResp {
        DumpMetersResp { meters: self.iter_meters().copied().collect() }
    }

    pub fn dump_counters(&self) -> DumpCountersResp {
        let counters = self
            .counters
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, c)| c.valid.load(Ordering::Relaxed))
            .map(|(id, c)| CounterResp {
                counter_id: id as u32,
                value: c.value.load(Ordering::Relaxed),
            })
            .collect();
        DumpCountersResp { counters }
    }
}
