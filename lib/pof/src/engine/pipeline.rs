// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The instruction pipeline.
//!
//! Every packet starts as if it had executed `GOTO_TABLE(first table,
//! offset 0)`. From there the pipeline runs the instruction list of
//! whichever entry the packet matched. A list ends in one of three
//! ways:
//!
//! * a GOTO instruction enters another entry, whose list replaces the
//!   current one;
//! * the last instruction completes and the packet is done;
//! * an instruction fails, and the packet is dropped with that error.
//!
//! A lookup miss ends the packet too. Depending on the configured
//! [`MissPolicy`] the packet is either dropped or sent to the
//! controller.

use super::action;
use super::action::Effects;
use super::action::OutputRecord;
use super::bitfield::copy_bits;
use super::bitfield::cover_bits;
use super::bitfield::write_u32_field;
use super::lookup::build_key;
use super::lookup::lookup;
use super::packet::PacketContext;
use super::packet::check_metadata_bits;
use super::packet::check_packet_bits;
use super::resource::ResourceStore;
use core::fmt;
use core::fmt::Display;
use pof_api::FIRST_TABLE_ID;
use pof_api::FlowEntry;
use pof_api::Instruction;
use pof_api::MAX_TABLE_HOPS;
use pof_api::METADATA_MAX_LEN;
use pof_api::PacketIn;
use pof_api::PofError;
use pof_api::REASON_NO_MATCH;
use pof_api::TableType;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

type Result<T> = core::result::Result<T, PofError>;

/// What to do with a packet that matches no entry.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MissPolicy {
    #[default]
    Drop,
    PacketIn,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PipelineCfg {
    #[serde(default)]
    pub miss_policy: MissPolicy,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// A DROP action, with its reason code.
    Action(u32),
    /// No entry matched and the miss policy is `Drop`.
    Miss,
    Error(PofError),
}

impl Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Action(code) => write!(f, "action({})", code),
            Self::Miss => write!(f, "miss"),
            Self::Error(e) => write!(f, "error({})", e),
        }
    }
}

/// The fate of one packet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProcessResult {
    Forwarded { outputs: usize },
    PacketIn,
    Dropped { reason: DropReason },
    /// The pipeline finished without emitting or dropping anything.
    Consumed,
}

/// The result of a packet along with everything it emitted. Outputs
/// produced before a failure are kept; it is up to the caller
/// whether to send them.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub result: ProcessResult,
    pub outputs: Vec<OutputRecord>,
    pub packet_ins: Vec<PacketIn>,
}

impl ProcessOutcome {
    pub fn error(&self) -> Option<&PofError> {
        match &self.result {
            ProcessResult::Dropped { reason: DropReason::Error(e) } => Some(e),
            _ => None,
        }
    }
}

/// The instruction list being run.
enum InstList {
    /// The implicit jump every packet starts with.
    Start([Instruction; 1]),
    Entry(Arc<FlowEntry>),
}

impl InstList {
    fn start() -> Self {
        Self::Start([Instruction::GotoTable {
            next_table_id: FIRST_TABLE_ID,
            packet_offset: 0,
        }])
    }

    fn as_slice(&self) -> &[Instruction] {
        match self {
            Self::Start(insts) => insts,
            Self::Entry(entry) => &entry.instructions,
        }
    }
}

/// What the pipeline does after an instruction.
enum Next {
    Advance,
    /// Run this entry's instructions. The global ID of its table comes
    /// along for loop reporting.
    Enter(Arc<FlowEntry>, u8),
    Miss,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    cfg: PipelineCfg,
}

impl Pipeline {
    pub fn new(cfg: PipelineCfg) -> Self {
        Self { cfg }
    }

    pub fn cfg(&self) -> &PipelineCfg {
        &self.cfg
    }

    /// Push one packet through the pipeline.
    pub fn process(
        &self,
        store: &ResourceStore,
        pkt: &mut PacketContext,
    ) -> ProcessOutcome {
        let mut fx = Effects::default();
        let mut missed = false;
        let res = self.run(store, pkt, &mut fx, &mut missed);

        let result = match res {
            Err(e) => ProcessResult::Dropped { reason: DropReason::Error(e) },
            Ok(()) if !fx.outputs.is_empty() => {
                ProcessResult::Forwarded { outputs: fx.outputs.len() }
            }
            Ok(()) if !fx.packet_ins.is_empty() => ProcessResult::PacketIn,
            Ok(()) => match fx.drop_reason {
                Some(code) => ProcessResult::Dropped {
                    reason: DropReason::Action(code),
                },
                None if missed => {
                    ProcessResult::Dropped { reason: DropReason::Miss }
                }
                None => ProcessResult::Consumed,
            },
        };

        if let ProcessResult::Dropped { reason } = &result {
            drop_probe(pkt.in_port(), reason);
        }

        ProcessOutcome {
            result,
            outputs: fx.outputs,
            packet_ins: fx.packet_ins,
        }
    }

    fn run(
        &self,
        store: &ResourceStore,
        pkt: &mut PacketContext,
        fx: &mut Effects,
        missed: &mut bool,
    ) -> Result<()> {
        let mut list = InstList::start();
        let mut cursor = 0;
        let mut hops = 0;

        while !pkt.done() {
            let insts = list.as_slice();
            // An entry with no instructions ends the pipeline.
            let Some(inst) = insts.get(cursor) else {
                break;
            };

            match self.dispatch(store, pkt, inst, fx)? {
                Next::Advance => {
                    cursor += 1;
                    if cursor == insts.len() {
                        pkt.set_done();
                    }
                }

                Next::Enter(entry, global) => {
                    hops += 1;
                    if hops > MAX_TABLE_HOPS {
                        return Err(PofError::TableLoopDetected(global));
                    }
                    list = InstList::Entry(entry);
                    cursor = 0;
                }

                Next::Miss => {
                    *missed = true;
                    pkt.set_done();
                }
            }
        }

        Ok(())
    }

    fn dispatch(
        &self,
        store: &ResourceStore,
        pkt: &mut PacketContext,
        inst: &Instruction,
        fx: &mut Effects,
    ) -> Result<Next> {
        match inst {
            Instruction::GotoTable { next_table_id, packet_offset } => self
                .goto_table(
                    store,
                    pkt,
                    *next_table_id,
                    *packet_offset as usize,
                    fx,
                ),

            Instruction::GotoDirectTable {
                next_table_id,
                table_entry_index,
                packet_offset,
            } => goto_direct_table(
                store,
                pkt,
                *next_table_id,
                *table_entry_index,
                *packet_offset as usize,
            ),

            Instruction::Meter { meter_id } => {
                let meter = store.meter(*meter_id)?;
                pkt.set_rate(meter.rate);
                Ok(Next::Advance)
            }

            Instruction::WriteMetadata { metadata_offset, len, value } => {
                write_metadata(pkt, *metadata_offset as usize, *len, *value)?;
                Ok(Next::Advance)
            }

            Instruction::WriteMetadataFromPacket {
                metadata_offset,
                packet_offset,
                len,
            } => {
                write_metadata_from_packet(
                    pkt,
                    *metadata_offset as usize,
                    *packet_offset as usize,
                    *len as usize,
                )?;
                Ok(Next::Advance)
            }

            Instruction::ApplyActions(actions) => {
                action::execute(store, pkt, actions, fx)?;
                Ok(Next::Advance)
            }

            Instruction::WriteActions(_)
            | Instruction::ClearActions
            | Instruction::Experimenter => {
                Err(PofError::UnsupportedInstruction)
            }
        }
    }

    fn goto_table(
        &self,
        store: &ResourceStore,
        pkt: &mut PacketContext,
        global: u8,
        packet_offset: usize,
        fx: &mut Effects,
    ) -> Result<Next> {
        pkt.advance(packet_offset)?;
        let (tt, id) = store.global_to_table_id(global)?;
        pkt.set_table(tt, id);
        let table = store.flow_table(tt, id)?;
        let key = build_key(&table.desc().match_fields, pkt)?;

        match lookup(table, &key) {
            Some(entry) => {
                lookup_probe(&table.desc().name, Some(entry));
                store.counter_increment(entry.counter_id)?;
                pkt.set_entry(entry.clone());
                Ok(Next::Enter(entry.clone(), global))
            }

            None => {
                lookup_probe(&table.desc().name, None);
                if self.cfg.miss_policy == MissPolicy::PacketIn {
                    let mut pi =
                        action::packet_in(store, pkt, REASON_NO_MATCH)?;
                    // No entry matched, so there is no cookie to report.
                    pi.cookie = 0;
                    fx.packet_ins.push(pi);
                }
                Ok(Next::Miss)
            }
        }
    }
}

fn goto_direct_table(
    store: &ResourceStore,
    pkt: &mut PacketContext,
    global: u8,
    index: u32,
    packet_offset: usize,
) -> Result<Next> {
    pkt.advance(packet_offset)?;
    let (tt, id) = store.global_to_table_id(global)?;
    if tt != TableType::Linear {
        return Err(PofError::BadTableType(tt as u8));
    }

    pkt.set_table(tt, id);
    let table = store.flow_table(tt, id)?;
    let entry = table.entry(index)?;
    lookup_probe(&table.desc().name, Some(entry));
    store.counter_increment(entry.counter_id)?;
    pkt.set_entry(entry.clone());
    Ok(Next::Enter(entry.clone(), global))
}

fn write_metadata(
    pkt: &mut PacketContext,
    metadata_offset: usize,
    len: u16,
    value: u32,
) -> Result<()> {
    if len > 32 {
        return Err(PofError::BadLen(len));
    }

    let len = len as usize;
    check_metadata_bits(metadata_offset, len)?;
    write_u32_field(pkt.metadata_mut(), value, metadata_offset, len)
}

fn write_metadata_from_packet(
    pkt: &mut PacketContext,
    metadata_offset: usize,
    packet_offset: usize,
    len: usize,
) -> Result<()> {
    check_packet_bits(packet_offset, len, pkt.left_len())?;
    check_metadata_bits(metadata_offset, len)?;

    let mut tmp = [0u8; METADATA_MAX_LEN];
    copy_bits(pkt.window(), &mut tmp, packet_offset, len);
    cover_bits(pkt.metadata_mut(), &tmp, metadata_offset, len);
    Ok(())
}

fn lookup_probe(table: &str, entry: Option<&Arc<FlowEntry>>) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            match entry {
                Some(e) => crate::pof_provider::lookup__match!(
                    || (table, e.index, e.priority)
                ),
                None => crate::pof_provider::lookup__no__match!(|| table),
            }
        } else {
            let (_, _) = (table, entry);
        }
    }
}

fn drop_probe(port: u32, reason: &DropReason) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            let reason_s = reason.to_string();
            crate::pof_provider::packet__drop!(
                || (port, reason_s.as_str())
            );
        } else {
            let (_, _) = (port, reason);
        }
    }
}
