// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Switch ports and the receive filter.

use pof_api::PofError;
use pof_api::PortDesc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

type Result<T> = core::result::Result<T, PofError>;

const ETHER_ADDR_LEN: usize = 6;
const ETHER_BROADCAST: [u8; ETHER_ADDR_LEN] = [0xff; ETHER_ADDR_LEN];

/// The ports known to the switch, keyed by port ID.
#[derive(Debug)]
pub struct PortTable {
    ports: BTreeMap<u32, PortDesc>,
    limit: u32,
}

impl PortTable {
    pub fn new(limit: u32) -> Self {
        Self { ports: BTreeMap::new(), limit }
    }

    /// Register a port. It keeps whatever `of_enable` the caller set.
    ///
    /// # Errors
    ///
    /// `PortExist` if the ID is taken, `BadPortId` if the table is
    /// already at its limit.
    pub fn add(&mut self, desc: PortDesc) -> Result<()> {
        if self.ports.contains_key(&desc.port_id) {
            return Err(PofError::PortExist(desc.port_id));
        }

        if self.ports.len() >= self.limit as usize {
            return Err(PofError::BadPortId(desc.port_id));
        }

        self.ports.insert(desc.port_id, desc);
        Ok(())
    }

    pub fn remove(&mut self, port_id: u32) -> Result<PortDesc> {
        self.ports.remove(&port_id).ok_or(PofError::BadPortId(port_id))
    }

    /// Look up a port, as OUTPUT does before sending.
    pub fn check_port_index(&self, port_id: u32) -> Result<&PortDesc> {
        self.ports.get(&port_id).ok_or(PofError::BadPortId(port_id))
    }

    /// Turn forwarding on or off for a port.
    pub fn enable(&mut self, port_id: u32, enable: bool) -> Result<&PortDesc> {
        let port = self
            .ports
            .get_mut(&port_id)
            .ok_or(PofError::BadPortId(port_id))?;
        port.of_enable = enable;
        Ok(port)
    }

    pub fn disable_all(&mut self) {
        for port in self.ports.values_mut() {
            port.of_enable = false;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortDesc> {
        self.ports.values()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }
}

/// How a frame is addressed, relative to the port it arrived on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameClass {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
}

impl FrameClass {
    /// Classify a frame by its destination MAC. A frame too short to
    /// carry one is never for this host.
    pub fn classify(frame: &[u8], hw_addr: &[u8; ETHER_ADDR_LEN]) -> Self {
        let Some(dst) = frame.get(..ETHER_ADDR_LEN) else {
            return Self::OtherHost;
        };

        if dst == ETHER_BROADCAST {
            Self::Broadcast
        } else if dst[0] & 0x01 != 0 {
            Self::Multicast
        } else if dst == hw_addr {
            Self::Host
        } else {
            Self::OtherHost
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiveFilter {
    Promiscuous,
    #[default]
    NonPromiscuous,
}

impl ReceiveFilter {
    pub fn accepts(&self, class: FrameClass) -> bool {
        match self {
            Self::Promiscuous => true,
            Self::NonPromiscuous => class != FrameClass::OtherHost,
        }
    }
}

/// What the receive stage does with a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RxVerdict {
    Accept,
    PortDisabled,
    /// The port looped back one of our own transmissions.
    Outgoing,
    TooLong,
    Filtered,
}

impl RxVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::PortDisabled => "port-disabled",
            Self::Outgoing => "outgoing",
            Self::TooLong => "too-long",
            Self::Filtered => "filtered",
        }
    }
}

/// Decide whether a frame received on `port` enters the pipeline.
pub fn rx_verdict(
    port: &PortDesc,
    filter: ReceiveFilter,
    frame: &[u8],
    outgoing: bool,
) -> RxVerdict {
    if !port.of_enable {
        return RxVerdict::PortDisabled;
    }

    if outgoing {
        return RxVerdict::Outgoing;
    }

    if frame.len() > port.mtu {
        return RxVerdict::TooLong;
    }

    if !filter.accepts(FrameClass::classify(frame, &port.hw_addr)) {
        return RxVerdict::Filtered;
    }

    RxVerdict::Accept
}
