// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress and certificate lifecycle.
//
// Certificate states:
//
//   Issued ──► Active ──► Expired        (time-derived)
//                 │           │
//                 └──► Revoked ◄┘         (explicit, terminal)
//
// `issue_certificate` does not look at the pass threshold. The gate lives in
// `record_final_assessment`, which is the only path that issues on the
// strength of a quiz result.

use std::path::Path;
use std::sync::Arc;

use hipaa_core::error::{ComplianceError, Result};
use hipaa_core::types::{
    Certificate, CertificateId, CertificateStatus, ComplianceStats, ProgressRecord, UserId,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::db::{EvidenceReceipt, SharedDatabase, lock, validate_score};
use crate::sanitize::{HtmlSanitizer, Sanitizer};

pub const LESSON_TITLE_MAX_LEN: usize = 200;
pub const REVOCATION_REASON_MAX_LEN: usize = 500;

/// Result of a graded final assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentOutcome {
    /// The encrypted progress record holding the answers.
    pub record_id: i64,
    pub score: f64,
    pub passed: bool,
    /// Present only when the score met the pass threshold.
    pub certificate: Option<Certificate>,
}

#[derive(Clone)]
pub struct ProgressManager {
    db: SharedDatabase,
    sanitizer: Arc<dyn Sanitizer>,
}

impl ProgressManager {
    pub fn new(db: SharedDatabase) -> Self {
        Self::with_sanitizer(db, Arc::new(HtmlSanitizer))
    }

    pub fn with_sanitizer(db: SharedDatabase, sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self { db, sanitizer }
    }

    /// Record a lesson, quiz, or checklist completion in plain form.
    #[instrument(skip(self, checklist))]
    pub fn save_progress(
        &self,
        user_id: UserId,
        lesson_title: Option<&str>,
        score: Option<f64>,
        checklist: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let lesson_title = match lesson_title {
            Some(raw) => {
                let title = self.sanitizer.sanitize(raw, LESSON_TITLE_MAX_LEN);
                if title.is_empty() {
                    return Err(ComplianceError::invalid("lesson_title", "must not be empty"));
                }
                Some(title)
            }
            None => None,
        };

        lock(&self.db)?.record_progress(user_id, lesson_title.as_deref(), score, checklist)
    }

    /// Record a checklist that may contain PHI. It is encrypted before
    /// storage and its contents never reach the audit trail.
    #[instrument(skip(self, checklist))]
    pub fn save_sensitive_progress(
        &self,
        user_id: UserId,
        checklist: &serde_json::Value,
        score: Option<f64>,
    ) -> Result<i64> {
        lock(&self.db)?.record_encrypted_progress(user_id, checklist, score)
    }

    /// Decrypt a stored checklist on behalf of `accessed_by`.
    pub fn load_sensitive_checklist(
        &self,
        record_id: i64,
        accessed_by: Option<UserId>,
    ) -> Result<serde_json::Value> {
        lock(&self.db)?.decrypt_checklist(record_id, accessed_by)
    }

    /// Issue a certificate. The caller is responsible for having checked
    /// that `score` is a pass.
    pub fn issue_certificate(&self, user_id: UserId, score: f64) -> Result<Certificate> {
        lock(&self.db)?.issue_certificate(user_id, score)
    }

    #[instrument(skip(self, reason))]
    pub fn revoke_certificate(&self, id: CertificateId, reason: &str) -> Result<Certificate> {
        let reason = self.sanitizer.sanitize(reason, REVOCATION_REASON_MAX_LEN);
        if reason.is_empty() {
            return Err(ComplianceError::invalid("reason", "a revocation reason is required"));
        }
        lock(&self.db)?.revoke_certificate(id, &reason)
    }

    /// Store a graded assessment and issue a certificate if it passed.
    ///
    /// The answers are saved as sensitive progress first; the certificate is
    /// issued in a second transaction. Both run under one lock, so no other
    /// caller on this handle observes the gap.
    #[instrument(skip(self, answers))]
    pub fn record_final_assessment(
        &self,
        user_id: UserId,
        answers: &serde_json::Value,
        score: f64,
    ) -> Result<AssessmentOutcome> {
        validate_score(score)?;

        let mut db = lock(&self.db)?;
        let record_id = db.record_encrypted_progress(user_id, answers, Some(score))?;
        let passed = score >= db.pass_threshold();
        let certificate = if passed {
            Some(db.issue_certificate(user_id, score)?)
        } else {
            None
        };

        info!(user_id = %user_id, score, passed, "final assessment recorded");
        Ok(AssessmentOutcome {
            record_id,
            score,
            passed,
            certificate,
        })
    }

    /// Whether `score` meets the configured pass threshold.
    pub fn passes(&self, score: f64) -> Result<bool> {
        Ok(score >= lock(&self.db)?.pass_threshold())
    }

    pub fn certificate_status(&self, id: CertificateId) -> Result<CertificateStatus> {
        let db = lock(&self.db)?;
        let now = db.now();
        let certificate = db
            .get_certificate(id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("certificate {id}")))?;
        Ok(certificate.status_at(now))
    }

    /// Encrypt a supporting file (a signed attestation, a scan) for
    /// `user_id`. The receipt's digest is what [`Self::restore_evidence`]
    /// checks against.
    pub fn attach_evidence(
        &self,
        user_id: UserId,
        source: &Path,
        dest: &Path,
    ) -> Result<EvidenceReceipt> {
        lock(&self.db)?.encrypt_evidence(user_id, source, dest)
    }

    pub fn restore_evidence(&self, receipt: &EvidenceReceipt, dest: &Path) -> Result<u64> {
        lock(&self.db)?.decrypt_evidence(receipt, dest)
    }

    pub fn user_certificates(&self, user_id: UserId) -> Result<Vec<Certificate>> {
        lock(&self.db)?.certificates_for_user(user_id)
    }

    pub fn user_progress(&self, user_id: UserId) -> Result<Vec<ProgressRecord>> {
        lock(&self.db)?.progress_for_user(user_id)
    }

    pub fn compliance_stats(&self) -> Result<ComplianceStats> {
        lock(&self.db)?.get_compliance_stats()
    }
}
