// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The pipeline rules file.
//!
//! A rules file is RON and lists the ports, meters, groups, tables and
//! entries a switch starts with. Everything except the ports is
//! installed through the admin handle, exactly as a controller would.

use anyhow::Context;
use pof::api::DEFAULT_PORT_MTU;
use pof::api::FlowEntry;
use pof::api::FlowTableDesc;
use pof::api::Group;
use pof::api::Meter;
use pof::api::PortDesc;
use pof_ctl::CtlHdl;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PortRule {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub mac: [u8; 6],
    #[serde(default = "enabled")]
    pub enable: bool,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
}

fn enabled() -> bool {
    true
}

fn default_mtu() -> usize {
    DEFAULT_PORT_MTU
}

impl PortRule {
    pub fn desc(&self) -> PortDesc {
        let name = match &self.name {
            Some(n) => n.clone(),
            None => format!("port{}", self.id),
        };
        let mut desc = PortDesc::new(self.id, &name, self.mac);
        desc.mtu = self.mtu;
        desc.of_enable = self.enable;
        desc
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Rules {
    pub ports: Vec<PortRule>,
    pub meters: Vec<Meter>,
    pub groups: Vec<Group>,
    pub tables: Vec<FlowTableDesc>,
    pub entries: Vec<FlowEntry>,
}

impl Rules {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_ron(&text)
            .with_context(|| format!("loading {}", path.display()))
    }

    pub fn from_ron(text: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Register the ports with the switch. The replay path attaches
    /// ports to the datapath instead.
    pub fn add_ports(&self, hdl: &CtlHdl) -> anyhow::Result<()> {
        for p in &self.ports {
            hdl.add_port(p.desc())
                .with_context(|| format!("adding port {}", p.id))?;
        }
        Ok(())
    }

    /// Install meters, groups, tables and entries, in that order, so
    /// every reference resolves by the time an entry arrives.
    pub fn install(&self, hdl: &CtlHdl) -> anyhow::Result<()> {
        for m in &self.meters {
            hdl.add_meter(*m)
                .with_context(|| format!("adding meter {}", m.meter_id))?;
        }
        for g in &self.groups {
            hdl.add_group(g.clone())
                .with_context(|| format!("adding group {}", g.group_id))?;
        }
        for t in &self.tables {
            hdl.add_table(t.clone()).with_context(|| {
                format!("adding table {} ({}{})", t.name, t.table_type, t.table_id)
            })?;
        }
        for e in &self.entries {
            hdl.add_entry(e.clone()).with_context(|| {
                format!(
                    "adding entry {} to table {}{}",
                    e.index, e.table_type, e.table_id
                )
            })?;
        }
        Ok(())
    }
}
