// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use serde::Serialize;

use pof::api::API_VERSION;
use pof::print::print_counters;
use pof::print::print_groups;
use pof::print::print_meters;
use pof::print::print_ports;
use pof::print::print_resource_report;
use pof::print::print_tables;
use pofswitch::Rules;
use pofswitch::Switch;
use pofswitch::SwitchConfig;
use pofswitch::logging;
use pofswitch::pcap;
use pofswitch::report::print_report;

/// Run and inspect a protocol-oblivious forwarding switch.
#[derive(Debug, Parser)]
#[command(version, about)]
enum Command {
    /// Replay a packet capture through the switch and show what comes
    /// out.
    Run {
        #[command(flatten)]
        common: Common,

        /// The pipeline rules file (RON).
        #[arg(long)]
        rules: PathBuf,

        /// The capture to replay (legacy pcap, Ethernet).
        #[arg(long)]
        pcap: PathBuf,

        /// The port the capture arrives on.
        #[arg(long)]
        port: u32,

        /// Give up if the capture hasn't drained after this long.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },

    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        #[command(flatten)]
        common: Common,
    },

    /// Load a rules file and dump the flow tables.
    DumpTables {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        rules: PathBuf,
    },

    /// Load a rules file and dump the groups.
    DumpGroups {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        rules: PathBuf,
    },

    /// Load a rules file and dump the meters.
    DumpMeters {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        rules: PathBuf,
    },

    /// Load a rules file and dump the counters.
    DumpCounters {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        rules: PathBuf,
    },

    /// Load a rules file and list the ports.
    ListPorts {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        rules: PathBuf,
    },

    /// Print the resource limits the switch reports to a controller.
    ResourceReport {
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// The switch configuration file (TOML). Defaults apply without
    /// one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of tables.
    #[arg(long)]
    json: bool,
}

impl Common {
    fn load(&self) -> anyhow::Result<SwitchConfig> {
        SwitchConfig::load_or_default(self.config.as_deref())
    }
}

fn print_json<T: Serialize>(v: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// A switch with `rules` loaded, for the dump commands.
fn loaded_switch(common: &Common, rules: &Path) -> anyhow::Result<Switch> {
    let cfg = common.load()?;
    let rules = Rules::load(rules)?;
    let sw = Switch::new(cfg, logging::discard())?;
    sw.load_rules(&rules)?;
    Ok(sw)
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    match cmd {
        Command::Run { common, rules, pcap, port, timeout_secs } => {
            let cfg = common.load()?;
            let (log, _guard) = logging::init(cfg.log_level);
            slog::debug!(log, "starting"; "api_version" => API_VERSION);
            if let Err(e) = pof::register_probes() {
                slog::warn!(log, "probes not registered: {}", e);
            }
            let rules = Rules::load(&rules)?;
            let frames = pcap::read_file(&pcap)?;
            let sw = Switch::new(cfg, log)?;
            let report = sw.replay(
                &rules,
                &frames,
                port,
                Duration::from_secs(timeout_secs),
            )?;
            if common.json {
                print_json(&report)?;
            } else {
                print_report(&report)?;
            }
        }

        Command::CheckConfig { common } => {
            let cfg = common.load()?;
            if common.json {
                print_json(&cfg)?;
            } else {
                print!("{}", toml::to_string_pretty(&cfg)?);
            }
        }

        Command::DumpTables { common, rules } => {
            let sw = loaded_switch(&common, &rules)?;
            let resp = sw.hdl().dump_tables()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_tables(&resp)?;
            }
        }

        Command::DumpGroups { common, rules } => {
            let sw = loaded_switch(&common, &rules)?;
            let resp = sw.hdl().dump_groups()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_groups(&resp)?;
            }
        }

        Command::DumpMeters { common, rules } => {
            let sw = loaded_switch(&common, &rules)?;
            let resp = sw.hdl().dump_meters()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_meters(&resp)?;
            }
        }

        Command::DumpCounters { common, rules } => {
            let sw = loaded_switch(&common, &rules)?;
            let resp = sw.hdl().dump_counters()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_counters(&resp)?;
            }
        }

        Command::ListPorts { common, rules } => {
            let sw = loaded_switch(&common, &rules)?;
            let resp = sw.hdl().list_ports()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_ports(&resp)?;
            }
        }

        Command::ResourceReport { common } => {
            let sw = Switch::new(common.load()?, logging::discard())?;
            let resp = sw.hdl().resource_report()?;
            if common.json {
                print_json(&resp)?;
            } else {
                print_resource_report(&resp)?;
            }
        }
    }

    Ok(())
}
