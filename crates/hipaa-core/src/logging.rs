// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tracing subscriber setup for whichever binary embeds the core.
// Library code only emits events; it never installs a subscriber itself.

use tracing_subscriber::EnvFilter;

use crate::error::{ComplianceError, Result};

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"`) when the variable is unset or invalid.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| ComplianceError::Config(format!("tracing init: {e}")))
}
