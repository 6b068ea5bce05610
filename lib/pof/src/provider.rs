// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Providers let the engine run in different contexts by plugging in
//! implementations of core services. Logging is the one service that
//! needs it today: unit tests print, the switch binary hands messages
//! to its `slog` drain. If a service doesn't have at least two obvious
//! implementations, it probably doesn't need to be a provider.

use core::fmt;
use core::fmt::Display;
use std::sync::Arc;

/// The set of all providers required by the data path.
#[derive(Clone)]
pub struct Providers {
    pub log: Arc<dyn LogProvider>,
}

impl Providers {
    pub fn println() -> Self {
        Self { log: Arc::new(PrintlnLog) }
    }

    pub fn slog(log: slog::Logger) -> Self {
        Self { log: Arc::new(SlogLog::new(log)) }
    }
}

/// A logging provider provides the means to log messages to some
/// destination based on the context in which the switch is running.
///
/// Logging levels are provided by [`LogLevel`]. These levels will map
/// to the underlying provider with varying degrees of success.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[derive(Clone, Copy)]
pub struct PrintlnLog;

impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Forward engine logs to a `slog` logger.
#[derive(Clone)]
pub struct SlogLog {
    log: slog::Logger,
}

impl SlogLog {
    pub fn new(log: slog::Logger) -> Self {
        Self { log }
    }
}

impl LogProvider for SlogLog {
    fn log(&self, level: LogLevel, msg: &str) {
        match level {
            LogLevel::Note => slog::info!(self.log, "{}", msg),
            LogLevel::Warn => slog::warn!(self.log, "{}", msg),
            LogLevel::Error => slog::error!(self.log, "{}", msg),
        }
    }
}
