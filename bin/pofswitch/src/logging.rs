// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use crate::config::LogLevel;
use slog::Drain;
use slog::Logger;
use slog::o;
use slog_async::AsyncGuard;

/// Build the root logger: terminal output, filtered by `RUST_LOG` when
/// it is set and by `level` otherwise, written from a background
/// thread. Keep the guard alive until exit so queued records are
/// flushed.
pub fn init(level: LogLevel) -> (Logger, AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    let filters = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| level.as_filter().to_string());
    let drain = slog_envlogger::LogBuilder::new(drain)
        .parse(&filters)
        .build()
        .fuse();

    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    let log = Logger::root(
        drain.fuse(),
        o!("component" => "pofswitch", "version" => env!("CARGO_PKG_VERSION")),
    );
    (log, guard)
}

/// A logger that goes nowhere, for tests and one-shot commands.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
