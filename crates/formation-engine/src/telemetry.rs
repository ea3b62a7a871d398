// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tracing subscriber initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install a fmt subscriber writing to stderr.
///
/// The filter respects `RUST_LOG` and defaults to `info`. Returns `false` when
/// a global subscriber was already installed (e.g. by a test harness).
pub fn init_subscriber() -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::Registry::default()
        .with(fmt)
        .with(filter)
        .try_init()
        .is_ok()
}
