// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Writing capture files for replay tests.

use pcap_parser::Linktype;
use pcap_parser::ToVec;
use pcap_parser::pcap::LegacyPcapBlock;
use pcap_parser::pcap::PcapHeader;
use pof::api::PACKET_RAW_MAX_LEN;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a little-endian Ethernet capture, one microsecond per frame.
pub struct PcapBuilder {
    file: File,
    ts_usec: u32,
}

impl PcapBuilder {
    /// Create `path`, truncating any existing file, and write the
    /// global header.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let mut file = File::create(path).unwrap();
        let mut hdr = PcapHeader {
            magic_number: 0xa1b2c3d4,
            version_major: 2,
            version_minor: 4,
            thiszone: 0,
            sigfigs: 0,
            snaplen: PACKET_RAW_MAX_LEN as u32,
            network: Linktype::ETHERNET,
        };
        file.write_all(&hdr.to_vec().unwrap()).unwrap();
        Self { file, ts_usec: 0 }
    }

    /// Append a whole frame; captured and original lengths are equal.
    pub fn add_frame(&mut self, frame: &[u8]) {
        let len = frame.len() as u32;
        let mut block = LegacyPcapBlock {
            ts_sec: 0,
            ts_usec: self.ts_usec,
            caplen: len,
            origlen: len,
            data: frame,
        };
        self.ts_usec += 1;
        self.file.write_all(&block.to_vec().unwrap()).unwrap();
    }
}
