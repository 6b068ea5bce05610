// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The switch error taxonomy.
//!
//! Every failure the data path or the admin surface can report is a
//! [`PofError`]. Each one maps onto an OpenFlow-style error type and
//! code, which is what the controller receives in an [`ErrorMsg`].

use super::TableType;
use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PofError {
    AllocationFailure,
    BadActionType,
    BadApiVersion { user: u64, switch: u64 },
    BadCounterId(u32),
    BadEntryId(u32),
    BadKeyLen(u16),
    BadLen(u16),
    BadMatchLength(u16),
    BadOffset(u16),
    BadPortId(u32),
    BadTableId(u8),
    BadTableSize(u32),
    BadTableType(u8),
    BadTag(u16),
    DeserCmdReq(String),
    EntryExist(u32),
    EntryUnexist(u32),
    GroupExist(u32),
    GroupLoopDetected(u32),
    InvalidGroup(u32),
    InvalidMeter(u32),
    MeterExist(u32),
    MetadataLenError,
    PacketLenError,
    PortExist(u32),
    QueueFailure,
    SerCmdResp(String),
    TableExist(TableType, u8),
    TableLoopDetected(u8),
    TableUnempty(TableType, u8),
    TableUnexist(TableType, u8),
    UnknownCounter(u32),
    UnknownGroup(u32),
    UnknownMeter(u32),
    UnsupportedInstruction,
}

/// The OpenFlow-style class of an error.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u16)]
pub enum ErrorType {
    BadRequest = 1,
    BadAction = 2,
    BadInstruction = 3,
    BadMatch = 4,
    FlowModFailed = 5,
    GroupModFailed = 6,
    PortModFailed = 7,
    TableModFailed = 8,
    MeterModFailed = 12,
    CounterModFailed = 13,
    SoftwareFailed = 0xfffe,
}

impl PofError {
    pub fn error_type(&self) -> ErrorType {
        use ErrorType::*;

        match self {
            Self::AllocationFailure | Self::QueueFailure => SoftwareFailed,
            Self::BadActionType
            | Self::BadLen(_)
            | Self::BadTag(_)
            | Self::BadOffset(_)
            | Self::PacketLenError
            | Self::MetadataLenError
            | Self::GroupLoopDetected(_) => BadAction,
            Self::BadApiVersion { .. }
            | Self::DeserCmdReq(_)
            | Self::SerCmdResp(_) => BadRequest,
            Self::BadCounterId(_) | Self::UnknownCounter(_) => {
                CounterModFailed
            }
            Self::BadEntryId(_) | Self::EntryExist(_) | Self::EntryUnexist(_) => {
                FlowModFailed
            }
            Self::BadKeyLen(_)
            | Self::BadTableId(_)
            | Self::BadTableSize(_)
            | Self::BadTableType(_)
            | Self::TableExist(..)
            | Self::TableUnempty(..)
            | Self::TableUnexist(..) => TableModFailed,
            Self::BadMatchLength(_) => BadMatch,
            Self::BadPortId(_) | Self::PortExist(_) => PortModFailed,
            Self::GroupExist(_)
            | Self::InvalidGroup(_)
            | Self::UnknownGroup(_) => GroupModFailed,
            Self::InvalidMeter(_)
            | Self::MeterExist(_)
            | Self::UnknownMeter(_) => MeterModFailed,
            Self::TableLoopDetected(_) | Self::UnsupportedInstruction => {
                BadInstruction
            }
        }
    }

    /// The code within [`Self::error_type()`].
    pub fn code(&self) -> u16 {
        match self {
            Self::AllocationFailure => 0,
            Self::QueueFailure => 1,

            Self::BadActionType => 0,
            Self::BadLen(_) => 1,
            Self::BadTag(_) => 2,
            Self::BadOffset(_) => 3,
            Self::PacketLenError => 4,
            Self::MetadataLenError => 5,
            Self::GroupLoopDetected(_) => 6,

            Self::BadApiVersion { .. } => 0,
            Self::DeserCmdReq(_) => 1,
            Self::SerCmdResp(_) => 2,

            Self::BadCounterId(_) => 0,
            Self::UnknownCounter(_) => 1,

            Self::BadEntryId(_) => 0,
            Self::EntryExist(_) => 1,
            Self::EntryUnexist(_) => 2,

            Self::BadTableType(_) => 0,
            Self::BadTableId(_) => 1,
            Self::BadTableSize(_) => 2,
            Self::BadKeyLen(_) => 3,
            Self::TableExist(..) => 4,
            Self::TableUnempty(..) => 5,
            Self::TableUnexist(..) => 6,

            Self::BadMatchLength(_) => 0,

            Self::BadPortId(_) => 0,
            Self::PortExist(_) => 1,

            Self::InvalidGroup(_) => 0,
            Self::GroupExist(_) => 1,
            Self::UnknownGroup(_) => 2,

            Self::InvalidMeter(_) => 0,
            Self::MeterExist(_) => 1,
            Self::UnknownMeter(_) => 2,

            Self::UnsupportedInstruction => 0,
            Self::TableLoopDetected(_) => 1,
        }
    }

    /// Errors the owning thread cannot recover from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllocationFailure | Self::QueueFailure)
    }
}

impl Display for PofError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AllocationFailure => write!(f, "allocation failure"),
            Self::BadActionType => write!(f, "unsupported action type"),
            Self::BadApiVersion { user, switch } => write!(
                f,
                "API version mismatch: user {} switch {}",
                user, switch
            ),
            Self::BadCounterId(id) => write!(f, "bad counter id: {}", id),
            Self::BadEntryId(idx) => write!(f, "bad entry index: {}", idx),
            Self::BadKeyLen(len) => write!(f, "bad key length: {}", len),
            Self::BadLen(len) => write!(f, "bad field length: {}", len),
            Self::BadMatchLength(len) => {
                write!(f, "bad match length: {}", len)
            }
            Self::BadOffset(off) => write!(f, "bad offset: {}", off),
            Self::BadPortId(id) => write!(f, "bad port id: {}", id),
            Self::BadTableId(id) => write!(f, "bad table id: {}", id),
            Self::BadTableSize(size) => write!(f, "bad table size: {}", size),
            Self::BadTableType(tt) => write!(f, "bad table type: {}", tt),
            Self::BadTag(len) => write!(f, "bad tag length: {}", len),
            Self::DeserCmdReq(msg) => {
                write!(f, "failed to deserialize request: {}", msg)
            }
            Self::EntryExist(idx) => write!(f, "entry {} exists", idx),
            Self::EntryUnexist(idx) => write!(f, "entry {} does not exist", idx),
            Self::GroupExist(id) => write!(f, "group {} exists", id),
            Self::GroupLoopDetected(id) => {
                write!(f, "group nesting too deep at group {}", id)
            }
            Self::InvalidGroup(id) => write!(f, "invalid group id: {}", id),
            Self::InvalidMeter(id) => write!(f, "invalid meter id: {}", id),
            Self::MeterExist(id) => write!(f, "meter {} exists", id),
            Self::MetadataLenError => write!(f, "metadata length exceeded"),
            Self::PacketLenError => write!(f, "packet length exceeded"),
            Self::PortExist(id) => write!(f, "port {} exists", id),
            Self::QueueFailure => write!(f, "queue failure"),
            Self::SerCmdResp(msg) => {
                write!(f, "failed to serialize response: {}", msg)
            }
            Self::TableExist(tt, id) => write!(f, "table {}/{} exists", tt, id),
            Self::TableLoopDetected(id) => {
                write!(f, "table hop limit reached at table {}", id)
            }
            Self::TableUnempty(tt, id) => {
                write!(f, "table {}/{} is not empty", tt, id)
            }
            Self::TableUnexist(tt, id) => {
                write!(f, "table {}/{} does not exist", tt, id)
            }
            Self::UnknownCounter(id) => write!(f, "unknown counter: {}", id),
            Self::UnknownGroup(id) => write!(f, "unknown group: {}", id),
            Self::UnknownMeter(id) => write!(f, "unknown meter: {}", id),
            Self::UnsupportedInstruction => {
                write!(f, "unsupported instruction")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PofError {}

/// An error report for the controller.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorMsg {
    pub error_type: ErrorType,
    pub code: u16,
    pub xid: u32,
}

impl ErrorMsg {
    pub fn new(err: &PofError, xid: u32) -> Self {
        Self { error_type: err.error_type(), code: err.code(), xid }
    }
}
