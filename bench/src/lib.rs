// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Workloads shared by the benchmarks.

use pof::engine::flow_table::FlowTable;
use pof::engine::lookup::Key;
use pof_test_utils::*;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Every benchmark draws from the same seed so runs are comparable.
pub const SEED: u64 = 0x706f_6621;

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

/// A unicast MAC unique to `i`.
pub fn mac_for(i: u32) -> [u8; 6] {
    let b = i.to_be_bytes();
    [0x02, 0, b[0], b[1], b[2], b[3]]
}

/// An EM table keyed on destination MAC, with one entry per slot.
/// Slot `i` matches `mac_for(i)`.
pub fn mac_table(size: u32) -> FlowTable {
    let desc = table_desc(TableType::Em, 0, "dmac", size, vec![dmac_field()]);
    let mut table = FlowTable::new(desc);
    for i in 0..size {
        let entry = flow_entry(
            TableType::Em,
            0,
            i,
            1,
            vec![MatchX::new(dmac_field(), &mac_for(i), &[0xff; 6])],
            vec![apply(vec![output(1)])],
        );
        table.insert(entry).unwrap();
    }
    table
}

/// The lookup key for a frame addressed to `mac`.
pub fn mac_key(mac: [u8; 6]) -> Key {
    Key::from_fields(&[&mac]).unwrap()
}

/// `n` frames of `len` bytes of random content.
pub fn random_frames(n: usize, len: usize) -> Vec<Vec<u8>> {
    let mut rng = rng();
    (0..n)
        .map(|_| (0..len).map(|_| rng.random::<u8>()).collect())
        .collect()
}
