// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! What a replay produced, and how to print it.

use pof::api::CounterResp;
use pof::api::PortStatus;
use pof::api::Upcall;
use pof::engine::datapath::DatapathStats;
use pof::print::write_hr;
use pof::print::write_hrb;
use serde::Serialize;
use std::io::Write;
use tabwriter::TabWriter;

/// How many leading bytes of a frame to show.
const PREVIEW_LEN: usize = 16;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SentFrame {
    pub port_id: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    /// The number of frames fed to the switch.
    pub frames: usize,
    /// Frames sent, grouped by port in ascending port order.
    pub sent: Vec<SentFrame>,
    /// Packet-ins and errors, in arrival order.
    pub upcalls: Vec<Upcall>,
    /// Port changes seen while the ports were attached.
    pub port_status: Vec<PortStatus>,
    pub stats: DatapathStats,
    pub counters: Vec<CounterResp>,
}

impl ReplayReport {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            sent: vec![],
            upcalls: vec![],
            port_status: vec![],
            stats: DatapathStats::default(),
            counters: vec![],
        }
    }

    pub fn record(&mut self, upcall: Upcall) {
        match upcall {
            Upcall::PortStatus(ps) => self.port_status.push(ps),
            other => self.upcalls.push(other),
        }
    }

    /// The frames sent out of one port.
    pub fn sent_on(&self, port_id: u32) -> impl Iterator<Item = &[u8]> {
        self.sent
            .iter()
            .filter(move |s| s.port_id == port_id)
            .map(|s| s.data.as_slice())
    }
}

fn preview(data: &[u8]) -> String {
    let mut s: String = data
        .iter()
        .take(PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect();
    if data.len() > PREVIEW_LEN {
        s.push_str("..");
    }
    s
}

pub fn print_report(report: &ReplayReport) -> std::io::Result<()> {
    print_report_into(&mut std::io::stdout(), report)
}

pub fn print_report_into(
    writer: &mut impl Write,
    report: &ReplayReport,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Replayed {} frames", report.frames)?;
    write_hrb(&mut t)?;
    writeln!(t, "PORT\tLEN\tDATA")?;
    for s in &report.sent {
        writeln!(t, "{}\t{}\t{}", s.port_id, s.data.len(), preview(&s.data))?;
    }
    t.flush()?;

    if !report.upcalls.is_empty() {
        writeln!(t)?;
        writeln!(t, "UPCALL\tTABLE\tREASON/CODE\tLEN")?;
        write_hr(&mut t)?;
        for u in &report.upcalls {
            match u {
                Upcall::PacketIn(pi) => writeln!(
                    t,
                    "packet-in\t{}\t{}\t{}",
                    pi.table_id, pi.reason, pi.total_len
                )?,
                Upcall::PortStatus(ps) => writeln!(
                    t,
                    "port-status\t-\t{:?}\t-",
                    ps.reason
                )?,
                Upcall::Error(e) => writeln!(
                    t,
                    "error\t-\t{:?}/{}\t-",
                    e.error_type, e.code
                )?,
            }
        }
        t.flush()?;
    }

    if !report.port_status.is_empty() {
        writeln!(t)?;
        writeln!(t, "PORT\tNAME\tCHANGE\tENABLED")?;
        write_hr(&mut t)?;
        for ps in &report.port_status {
            writeln!(
                t,
                "{}\t{}\t{:?}\t{}",
                ps.port.port_id, ps.port.name, ps.reason, ps.port.of_enable
            )?;
        }
        t.flush()?;
    }

    let st = &report.stats;
    writeln!(t)?;
    writeln!(t, "STAT\tVALUE")?;
    write_hr(&mut t)?;
    for (name, v) in [
        ("rx", st.rx_packets),
        ("rx filtered", st.rx_filtered),
        ("forwarded", st.forwarded),
        ("packet-in", st.packet_ins),
        ("dropped", st.dropped),
        ("consumed", st.consumed),
        ("errors", st.errors),
        ("tx", st.tx_packets),
        ("tx errors", st.tx_errors),
    ] {
        writeln!(t, "{name}\t{v}")?;
    }
    t.flush()?;

    if !report.counters.is_empty() {
        writeln!(t)?;
        writeln!(t, "COUNTER\tVALUE")?;
        write_hr(&mut t)?;
        for c in &report.counters {
            writeln!(t, "{}\t{}", c.counter_id, c.value)?;
        }
    }
    t.flush()
}
