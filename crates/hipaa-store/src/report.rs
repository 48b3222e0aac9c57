// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compliance reporting. This module picks the output path and pulls the
// figures; rendering them as CSV or JSON is the formatter's job.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::ComplianceStats;
use hipaa_core::{Clock, SystemClock, TrainingConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::db::{SharedDatabase, lock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(ComplianceError::UnsupportedFormat(s.to_owned())),
        }
    }
}

/// Writes a statistics snapshot to `dest` in the requested format.
pub trait ReportFormatter: Send + Sync {
    fn write_report(
        &self,
        stats: &ComplianceStats,
        format: ReportFormat,
        dest: &Path,
    ) -> Result<()>;
}

pub struct ComplianceReporter {
    reports_dir: PathBuf,
    formatter: Arc<dyn ReportFormatter>,
    clock: Arc<dyn Clock>,
}

impl ComplianceReporter {
    pub fn new(config: &TrainingConfig, formatter: Arc<dyn ReportFormatter>) -> Self {
        Self::with_clock(config.reports_dir(), formatter, Arc::new(SystemClock))
    }

    pub fn with_clock(
        reports_dir: impl Into<PathBuf>,
        formatter: Arc<dyn ReportFormatter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            formatter,
            clock,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Hand `stats` to the formatter and return the path written.
    ///
    /// An unknown format fails before the reports directory is created.
    #[instrument(skip(self, stats))]
    pub fn generate_report(&self, stats: &ComplianceStats, format: &str) -> Result<PathBuf> {
        let format: ReportFormat = format.parse()?;
        self.write(stats, format)
    }

    /// Pull fresh statistics from `db` and write them out.
    pub fn generate(&self, db: &SharedDatabase, format: &str) -> Result<PathBuf> {
        let format: ReportFormat = format.parse()?;
        let stats = lock(db)?.get_compliance_stats()?;
        self.write(&stats, format)
    }

    fn write(&self, stats: &ComplianceStats, format: ReportFormat) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.reports_dir)?;
        let stamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let dest = self
            .reports_dir
            .join(format!("enterprise_report_{stamp}.{}", format.extension()));

        self.formatter.write_report(stats, format, &dest)?;

        info!(path = %dest.display(), %format, "compliance report written");
        Ok(dest)
    }
}
