// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The forwarding engine.

pub mod action;
pub mod bitfield;
pub mod checksum;
pub mod ctl;
pub mod datapath;
pub mod flow_table;
pub mod lookup;
pub mod packet;
pub mod pipeline;
pub mod port;
pub mod resource;

pub use action::Effects;
pub use action::OutputRecord;
pub use packet::PacketContext;
pub use pipeline::DropReason;
pub use pipeline::MissPolicy;
pub use pipeline::Pipeline;
pub use pipeline::PipelineCfg;
pub use pipeline::ProcessOutcome;
pub use pipeline::ProcessResult;
pub use resource::ResourceStore;
pub use resource::SharedStore;
pub use resource::StoreCfg;
