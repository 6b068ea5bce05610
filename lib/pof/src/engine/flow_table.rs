// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The flow table implementation.
//!
//! A flow table is a fixed number of pre-allocated slots. The
//! controller chooses the slot of every entry it installs, and
//! GOTO_DIRECT_TABLE addresses slots directly, so the table never
//! compacts or reorders. Entries are stored behind an `Arc` so a
//! packet can keep executing the entry it matched while the control
//! thread replaces the slot.

use pof_api::FlowEntry;
use pof_api::FlowTableDesc;
use pof_api::PofError;
use std::sync::Arc;

type Result<T> = core::result::Result<T, PofError>;

#[derive(Debug)]
pub struct FlowTable {
    desc: FlowTableDesc,
    slots: Vec<Option<Arc<FlowEntry>>>,
    entry_num: u32,
}

impl FlowTable {
    pub fn new(desc: FlowTableDesc) -> Self {
        let slots = vec![None; desc.size as usize];
        Self { desc, slots, entry_num: 0 }
    }

    pub fn desc(&self) -> &FlowTableDesc {
        &self.desc
    }

    /// The number of occupied slots.
    pub fn num_entries(&self) -> u32 {
        self.entry_num
    }

    pub fn is_empty(&self) -> bool {
        self.entry_num == 0
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.desc.size {
            return Err(PofError::BadEntryId(index));
        }
        Ok(())
    }

    /// Fetch the entry in slot `index`.
    ///
    /// # Errors
    ///
    /// `BadEntryId` when `index` is not below the table size,
    /// `EntryUnexist` when the slot is empty.
    pub fn entry(&self, index: u32) -> Result<&Arc<FlowEntry>> {
        self.check_index(index)?;
        self.slots[index as usize]
            .as_ref()
            .ok_or(PofError::EntryUnexist(index))
    }

    /// Iterate the occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FlowEntry>> {
        self.slots.iter().flatten()
    }

    /// Find an installed entry with the same priority and key as
    /// `entry`.
    pub fn find_duplicate(&self, entry: &FlowEntry) -> Option<u32> {
        self.iter()
            .find(|e| {
                e.priority == entry.priority
                    && e.matches.len() == entry.matches.len()
                    && e.matches
                        .iter()
                        .zip(entry.matches.iter())
                        .all(|(a, b)| a.same_key(b))
            })
            .map(|e| e.index)
    }

    /// Fill an empty slot.
    pub fn insert(&mut self, entry: FlowEntry) -> Result<()> {
        self.check_index(entry.index)?;
        let slot = &mut self.slots[entry.index as usize];
        if slot.is_some() {
            return Err(PofError::EntryExist(entry.index));
        }

        *slot = Some(Arc::new(entry));
        self.entry_num += 1;
        Ok(())
    }

    /// Replace an occupied slot, returning the old entry.
    pub fn replace(&mut self, entry: FlowEntry) -> Result<Arc<FlowEntry>> {
        self.check_index(entry.index)?;
        let index = entry.index;
        match &mut self.slots[index as usize] {
            Some(old) => Ok(std::mem::replace(old, Arc::new(entry))),
            None => Err(PofError::EntryUnexist(index)),
        }
    }

    /// Empty a slot, returning the entry it held.
    pub fn remove(&mut self, index: u32) -> Result<Arc<FlowEntry>> {
        self.check_index(index)?;
        let old = self.slots[index as usize]
            .take()
            .ok_or(PofError::EntryUnexist(index))?;
        self.entry_num -= 1;
        Ok(old)
    }
}
