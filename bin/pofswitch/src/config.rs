// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The switch configuration file.
//!
//! Every setting has a default, so an empty file (or no file at all)
//! describes a switch with the stock resource limits.

use anyhow::Context;
use anyhow::bail;
use pof::api::TableType;
use pof::api::defaults;
use pof::engine::MissPolicy;
use pof::engine::PipelineCfg;
use pof::engine::StoreCfg;
use pof::engine::datapath::DatapathCfg;
use pof::engine::port::ReceiveFilter;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// The number of flow tables of each type.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableCounts {
    pub mm: u8,
    pub lpm: u8,
    pub em: u8,
    pub linear: u8,
}

impl Default for TableCounts {
    fn default() -> Self {
        Self {
            mm: defaults::MM_TABLE_NUM,
            lpm: defaults::LPM_TABLE_NUM,
            em: defaults::EM_TABLE_NUM,
            linear: defaults::LINEAR_TABLE_NUM,
        }
    }
}

impl TableCounts {
    fn as_array(&self) -> [u8; 4] {
        let mut a = [0; 4];
        a[TableType::Mm.idx()] = self.mm;
        a[TableType::Lpm.idx()] = self.lpm;
        a[TableType::Em.idx()] = self.em;
        a[TableType::Linear.idx()] = self.linear;
        a
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// The level as an envlogger filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SwitchConfig {
    pub device_id: u32,
    pub tables: TableCounts,
    pub table_size: u32,
    /// The longest key any table may declare, in bits.
    pub key_len: u16,
    pub meter_num: u32,
    pub counter_num: u32,
    pub group_num: u32,
    pub port_num_max: u32,
    pub miss_policy: MissPolicy,
    pub rx_filter: ReceiveFilter,
    pub queue_depth: usize,
    pub dup_entry_check: bool,
    /// Clear every resource once the control channel goes away.
    pub auto_clear: bool,
    pub log_level: LogLevel,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        let store = StoreCfg::default();
        Self {
            device_id: store.device_id,
            tables: TableCounts::default(),
            table_size: store.table_size,
            key_len: store.key_len,
            meter_num: store.meter_num,
            counter_num: store.counter_num,
            group_num: store.group_num,
            port_num_max: store.port_num_max,
            miss_policy: MissPolicy::default(),
            rx_filter: ReceiveFilter::default(),
            queue_depth: defaults::QUEUE_DEPTH,
            dup_entry_check: store.dup_entry_check,
            auto_clear: false,
            log_level: LogLevel::default(),
        }
    }
}

impl SwitchConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text)
            .with_context(|| format!("loading {}", path.display()))
    }

    /// Load the file at `path`, or the defaults when there is none.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        // Global table IDs are a single byte.
        let total: u32 =
            self.tables.as_array().iter().map(|&n| u32::from(n)).sum();
        if total > u32::from(u8::MAX) + 1 {
            bail!("{total} flow tables do not fit in a one-byte table ID");
        }
        if self.tables.mm == 0 {
            bail!("at least one MM table is required for the first table");
        }
        if self.table_size == 0 {
            bail!("table-size must be at least 1");
        }
        // Counter 0 means "no counter".
        if self.counter_num == 0 {
            bail!("counter-num must be at least 1");
        }
        if self.queue_depth == 0 {
            bail!("queue-depth must be at least 1");
        }
        Ok(())
    }

    pub fn store_cfg(&self) -> StoreCfg {
        StoreCfg {
            device_id: self.device_id,
            table_num: self.tables.as_array(),
            table_size: self.table_size,
            key_len: self.key_len,
            meter_num: self.meter_num,
            counter_num: self.counter_num,
            group_num: self.group_num,
            port_num_max: self.port_num_max,
            dup_entry_check: self.dup_entry_check,
        }
    }

    pub fn datapath_cfg(&self) -> DatapathCfg {
        DatapathCfg {
            pipeline: PipelineCfg { miss_policy: self.miss_policy },
            rx_filter: self.rx_filter,
            queue_depth: self.queue_depth,
        }
    }
}
