// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Reading Ethernet frames out of a legacy pcap file.

use anyhow::Context;
use anyhow::anyhow;
use anyhow::bail;
use pcap_parser::Linktype;
use pcap_parser::pcap;
use std::path::Path;

pub fn read_file(path: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading {}", path.display()))?;
    read_frames(&bytes).with_context(|| format!("parsing {}", path.display()))
}

/// Every frame in a capture, in file order.
pub fn read_frames(bytes: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
    let (mut rest, hdr) = pcap::parse_pcap_header(bytes)
        .map_err(|e| anyhow!("bad pcap header: {e:?}"))?;

    if hdr.network != Linktype::ETHERNET {
        bail!("unsupported link type {:?}", hdr.network);
    }

    let big_endian = hdr.is_bigendian();
    let mut frames = vec![];
    while !rest.is_empty() {
        let parsed = if big_endian {
            pcap::parse_pcap_frame_be(rest)
        } else {
            pcap::parse_pcap_frame(rest)
        };
        let (next, block) = parsed
            .map_err(|e| anyhow!("bad frame {}: {e:?}", frames.len()))?;

        // The switch needs the whole frame.
        if block.caplen < block.origlen {
            bail!(
                "frame {} truncated to {} of {} bytes",
                frames.len(),
                block.caplen,
                block.origlen
            );
        }

        frames.push(block.data.to_vec());
        rest = next;
    }

    Ok(frames)
}
