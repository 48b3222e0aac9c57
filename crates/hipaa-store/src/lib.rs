// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! hipaa-store: the transactional training store.
//!
//! A [`Database`] owns one SQLite connection. Each mutation it performs and
//! the matching audit entry are committed together or not at all. The
//! [`UserRegistry`], [`ProgressManager`], and [`ComplianceReporter`] share a
//! [`SharedDatabase`] handle:
//!
//! ```no_run
//! use hipaa_core::TrainingConfig;
//! use hipaa_store::{Database, ProgressManager, UserRegistry, shared};
//!
//! # fn main() -> hipaa_core::Result<()> {
//! let config = TrainingConfig::from_env()?;
//! let db = shared(Database::open(&config)?);
//! let users = UserRegistry::new(db.clone());
//! let training = ProgressManager::new(db);
//!
//! let alice = users.create_user("alice", "Alice", "staff")?;
//! training.save_progress(alice, Some("PHI Basics"), None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod db;
mod decode;
pub mod health;
pub mod registry;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod training;

#[cfg(test)]
mod test_support;

pub use db::{Database, EvidenceReceipt, SharedDatabase, shared};
pub use health::{HealthReport, HealthStatus};
pub use registry::UserRegistry;
pub use report::{ComplianceReporter, ReportFormat, ReportFormatter};
pub use sanitize::{HtmlSanitizer, Sanitizer};
pub use training::{AssessmentOutcome, ProgressManager};
