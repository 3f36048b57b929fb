// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the master crate.

use std::time::Duration;

/// Overrides the scheduler's health-check/completion tick period (10 s by
/// default), for shrinking it in integration tests without a CLI flag.
pub fn tick_interval_override() -> Option<Duration> {
    std::env::var("DISPATCH_TICK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
