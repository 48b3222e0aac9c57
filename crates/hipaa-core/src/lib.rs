// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HIPAA training core: types, configuration, and errors shared across all crates.

pub mod clock;
pub mod config;
pub mod error;
pub mod human_errors;
pub mod logging;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EncryptionSecret, TrainingConfig, TrainingSettings};
pub use error::{ComplianceError, Result};
pub use types::*;
