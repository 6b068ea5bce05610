// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Print command responses in human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both the switch binary and integration tests.

use crate::api::DumpCountersResp;
use crate::api::DumpGroupsResp;
use crate::api::DumpMetersResp;
use crate::api::DumpTablesResp;
use crate::api::EntryDump;
use crate::api::ListPortsResp;
use crate::api::ResourceReport;
use crate::api::TableDump;
use itertools::Itertools;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpTablesResp`].
pub fn print_tables(resp: &DumpTablesResp) -> std::io::Result<()> {
    print_tables_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpTablesResp`] into a given writer.
pub fn print_tables_into(
    writer: &mut impl Write,
    resp: &DumpTablesResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    for (i, table) in resp.tables.iter().enumerate() {
        if i > 0 {
            writeln!(t)?;
        }
        print_table_header(&mut t, table)?;
        write_hr(&mut t)?;
        print_entry_header(&mut t)?;
        for ed in &table.entries {
            print_entry(&mut t, ed)?;
        }
        t.flush()?;
    }

    t.flush()
}

fn print_table_header(
    t: &mut impl Write,
    table: &TableDump,
) -> std::io::Result<()> {
    let desc = &table.desc;
    let fields = if desc.match_fields.is_empty() {
        "*".to_string()
    } else {
        desc.match_fields.iter().join(" ")
    };
    writeln!(
        t,
        "Table {} ({}{}, global {}): {}/{} entries, key {}",
        desc.name,
        desc.table_type,
        desc.table_id,
        table.global_id,
        table.entries.len(),
        desc.size,
        fields,
    )
}

/// Print the header for the [`print_entry()`] output.
pub fn print_entry_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "IDX\tPRI\tHITS\tCOOKIE\tMATCH\tINSTRUCTIONS")
}

/// Print one flow entry. Each instruction after the first gets a line
/// of its own.
pub fn print_entry(t: &mut impl Write, ed: &EntryDump) -> std::io::Result<()> {
    let e = &ed.entry;
    let matches = if e.matches.is_empty() {
        "*".to_string()
    } else {
        e.matches.iter().join(" ")
    };

    let mut insts = e.instructions.iter();
    let first = insts.next().map(ToString::to_string).unwrap_or_default();
    writeln!(
        t,
        "{}\t{}\t{}\t{:#x}\t{}\t{}",
        e.index, e.priority, ed.hits, e.cookie, matches, first
    )?;
    for inst in insts {
        writeln!(t, "\t\t\t\t\t{inst}")?;
    }

    Ok(())
}

/// Print a [`DumpGroupsResp`].
pub fn print_groups(resp: &DumpGroupsResp) -> std::io::Result<()> {
    print_groups_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpGroupsResp`] into a given writer.
pub fn print_groups_into(
    writer: &mut impl Write,
    resp: &DumpGroupsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tCOUNTER\tHITS\tACTIONS")?;
    for gd in &resp.groups {
        let g = &gd.group;
        writeln!(
            t,
            "{}\t{}\t{}\t{}",
            g.group_id,
            g.counter_id,
            gd.hits,
            g.actions.iter().join(", ")
        )?;
    }
    t.flush()
}

/// Print a [`DumpMetersResp`].
pub fn print_meters(resp: &DumpMetersResp) -> std::io::Result<()> {
    print_meters_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpMetersResp`] into a given writer.
pub fn print_meters_into(
    writer: &mut impl Write,
    resp: &DumpMetersResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tRATE")?;
    for m in &resp.meters {
        writeln!(t, "{}\t{}", m.meter_id, m.rate)?;
    }
    t.flush()
}

/// Print a [`DumpCountersResp`].
pub fn print_counters(resp: &DumpCountersResp) -> std::io::Result<()> {
    print_counters_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpCountersResp`] into a given writer.
pub fn print_counters_into(
    writer: &mut impl Write,
    resp: &DumpCountersResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tVALUE")?;
    for c in &resp.counters {
        writeln!(t, "{}\t{}", c.counter_id, c.value)?;
    }
    t.flush()
}

/// Print a [`ListPortsResp`].
pub fn print_ports(resp: &ListPortsResp) -> std::io::Result<()> {
    print_ports_into(&mut std::io::stdout(), resp)
}

/// Print a [`ListPortsResp`] into a given writer.
pub fn print_ports_into(
    writer: &mut impl Write,
    resp: &ListPortsResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "ID\tNAME\tMAC\tMTU\tENABLED\tSTATE")?;
    for p in &resp.ports {
        let mac = p.hw_addr.iter().map(|b| format!("{b:02x}")).join(":");
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}\t{:?}",
            p.port_id, p.name, mac, p.mtu, p.of_enable, p.state
        )?;
    }
    t.flush()
}

/// Print a [`ResourceReport`].
pub fn print_resource_report(resp: &ResourceReport) -> std::io::Result<()> {
    print_resource_report_into(&mut std::io::stdout(), resp)
}

/// Print a [`ResourceReport`] into a given writer.
pub fn print_resource_report_into(
    writer: &mut impl Write,
    resp: &ResourceReport,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "Device {}", resp.device_id)?;
    write_hrb(&mut t)?;
    writeln!(t, "TYPE\tTABLES\tSIZE\tKEY BITS")?;
    for tr in &resp.tables {
        writeln!(
            t,
            "{}\t{}\t{}\t{}",
            tr.table_type, tr.table_num, tr.size, tr.key_len
        )?;
    }
    t.flush()?;

    writeln!(t)?;
    writeln!(t, "counters\t{}", resp.counter_num)?;
    writeln!(t, "meters\t{}", resp.meter_num)?;
    writeln!(t, "groups\t{}", resp.group_num)?;
    writeln!(t, "ports\t{}", resp.port_num_max)?;
    t.flush()
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Action;
    use crate::api::CounterResp;
    use crate::api::FlowEntry;
    use crate::api::FlowTableDesc;
    use crate::api::Group;
    use crate::api::GroupDump;
    use crate::api::Instruction;
    use crate::api::Match;
    use crate::api::MatchX;
    use crate::api::TableType;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
    {
        let mut buf = vec![];
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn tables_list_every_instruction() {
        let resp = DumpTablesResp {
            tables: vec![TableDump {
                desc: FlowTableDesc {
                    table_type: TableType::Em,
                    table_id: 0,
                    name: "dmac".into(),
                    size: 4,
                    key_len: 48,
                    match_fields: vec![Match::packet(0, 48)],
                },
                global_id: 9,
                entries: vec![EntryDump {
                    entry: FlowEntry {
                        table_type: TableType::Em,
                        table_id: 0,
                        index: 1,
                        priority: 5,
                        counter_id: 3,
                        cookie: 0xab,
                        cookie_mask: 0,
                        idle_timeout: 0,
                        hard_timeout: 0,
                        matches: vec![MatchX::new(
                            Match::packet(0, 48),
                            &[2, 0, 0, 0, 0, 1],
                            &[0xff; 6],
                        )],
                        instructions: vec![
                            Instruction::Meter { meter_id: 1 },
                            Instruction::ClearActions,
                        ],
                    },
                    hits: 42,
                }],
            }],
        };

        let out = render(|w| print_tables_into(w, &resp));
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("Table dmac"));
        assert!(lines[0].contains("global 9"));
        assert!(lines[2].starts_with("IDX"));
        assert!(lines[3].contains("42"));
        assert!(lines[3].contains("0xab"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn groups_and_counters() {
        let groups = DumpGroupsResp {
            groups: vec![GroupDump {
                group: Group {
                    group_id: 2,
                    counter_id: 0,
                    actions: vec![
                        Action::Counter { counter_id: 5 },
                        Action::Drop { reason_code: 0 },
                    ],
                },
                hits: 0,
            }],
        };
        let out = render(|w| print_groups_into(w, &groups));
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains(", "));

        let counters = DumpCountersResp {
            counters: vec![CounterResp { counter_id: 5, value: 9 }],
        };
        let out = render(|w| print_counters_into(w, &counters));
        assert_eq!(out.lines().nth(1).map(|l| l.split_whitespace().collect::<Vec<_>>()),
            Some(vec!["5", "9"]));
    }
}
