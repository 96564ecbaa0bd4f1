// /////////////////////////////////////////////////////////////////////////////
// Strongbox
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Logging
//!
//! Structured logging initialization on `tracing`. The core itself only
//! emits spans and events; an embedding shell (or a test) calls
//! [`init_logging`] once to install a subscriber. Filtering is
//! `RUST_LOG`-driven through `EnvFilter`, with the caller's level as the
//! fallback when the variable is absent or unparsable. Secrets never appear
//! in log fields: stores and sync log ids, sizes, and counts, not contents.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber.
///
/// The active filter comes from `RUST_LOG` when set (full `EnvFilter`
/// directive syntax, per-target overrides included); otherwise every target
/// logs at `default_level`. Safe to call more than once; subsequent calls
/// are no-ops.
pub fn init_logging(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
