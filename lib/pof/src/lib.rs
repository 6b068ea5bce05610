// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The POF forwarding engine.
//!
//! Frames enter on ports, are pushed through a programmable pipeline
//! of flow tables, and leave as outputs or controller upcalls. The
//! [`engine`] module holds the pipeline and everything it depends on;
//! [`engine::datapath`] wires it to threads and queues.

#![allow(clippy::len_without_is_empty)]
#![allow(non_snake_case)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[macro_use]
extern crate cfg_if;

pub use pof_api as api;

pub mod engine;
pub mod print;
pub mod provider;

// ================================================================
// DTrace USDT Provider
//
// Allows tracing table lookups, action failures and drops with
// dtrace(1M) when built with the `usdt` feature.
// ================================================================
#[cfg(feature = "usdt")]
#[usdt::provider]
mod pof_provider {
    fn lookup__match(table: &str, index: u32, priority: u16) {}
    fn lookup__no__match(table: &str) {}
    fn action__error(action: &str, err: &str) {}
    fn packet__drop(port: u32, reason: &str) {}
}

/// Register the USDT probes with the kernel. Without the `usdt`
/// feature this does nothing.
pub fn register_probes() -> Result<(), String> {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            usdt::register_probes().map_err(|e| e.to_string())
        } else {
            Ok(())
        }
    }
}
