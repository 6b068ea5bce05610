// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The pieces of the `pofswitch` binary: configuration, rules files,
//! capture replay and logging.

pub mod config;
pub mod logging;
pub mod pcap;
pub mod report;
pub mod rules;
pub mod switch;

pub use config::SwitchConfig;
pub use rules::Rules;
pub use switch::Switch;
