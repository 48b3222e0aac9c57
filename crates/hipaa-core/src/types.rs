// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the compliance training store.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ComplianceError;

/// Row identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed set of roles a user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Auditor,
}

impl Role {
    /// The lowercase name stored in the `users.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Auditor => "auditor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "auditor" => Ok(Self::Auditor),
            other => Err(ComplianceError::invalid(
                "role",
                format!("{other:?} is not one of admin, staff, auditor"),
            )),
        }
    }
}

/// A registered trainee, administrator, or auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Checklist payload as persisted in `training_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChecklistPayload {
    /// Non-sensitive checklist stored as JSON text.
    Plain(serde_json::Value),
    /// Sensitive checklist stored as an AES-GCM ciphertext blob.
    Encrypted(Vec<u8>),
}

impl ChecklistPayload {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }
}

/// One lesson, quiz, or checklist submission. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub id: i64,
    pub user_id: UserId,
    pub lesson_title: Option<String>,
    pub quiz_score: Option<f64>,
    pub checklist: Option<ChecklistPayload>,
    pub completed_at: DateTime<Utc>,
}

/// Opaque, globally unique certificate identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateId(pub Uuid);

impl CertificateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CertificateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CertificateId {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| ComplianceError::Format(format!("certificate id {s:?}: {e}")))
    }
}

/// Derived lifecycle state of a certificate at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateStatus {
    /// Unrevoked and not yet past its expiry.
    Active,
    /// Past its expiry and never revoked.
    Expired,
    /// Explicitly revoked. Terminal.
    Revoked,
}

/// A training certificate.
///
/// Everything except the revocation fields is fixed at issuance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub user_id: UserId,
    pub score: f64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revocation_reason: Option<String>,
}

impl Certificate {
    /// Build a fresh, unrevoked certificate valid for `validity_days` from `issued_at`.
    pub fn issue(
        user_id: UserId,
        score: f64,
        issued_at: DateTime<Utc>,
        validity_days: u32,
    ) -> Self {
        Self {
            id: CertificateId::new(),
            user_id,
            score,
            issued_at,
            expires_at: issued_at + Duration::days(i64::from(validity_days)),
            revoked: false,
            revoked_at: None,
            revocation_reason: None,
        }
    }

    /// Expiry is pure time arithmetic; revocation does not affect it.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> CertificateStatus {
        if self.revoked {
            CertificateStatus::Revoked
        } else if self.is_expired_at(now) {
            CertificateStatus::Expired
        } else {
            CertificateStatus::Active
        }
    }
}

/// Aggregate compliance figures, always recomputed from stored rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub total_users: u64,
    /// Mean of all non-null quiz scores, 0.0 when there are none.
    pub avg_score: f64,
    /// Percentage of scored records at or above the pass threshold.
    pub pass_rate: f64,
    pub total_certs: u64,
    pub active_certs: u64,
    pub expired_certs: u64,
    pub revoked_certs: u64,
    pub generated_at: DateTime<Utc>,
}

impl ComplianceStats {
    /// The zero state reported for an empty store.
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            total_users: 0,
            avg_score: 0.0,
            pass_rate: 0.0,
            total_certs: 0,
            active_certs: 0,
            expired_certs: 0,
            revoked_certs: 0,
            generated_at,
        }
    }
}

/// Action codes written to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCode {
    UserCreated,
    UserDeleted,
    ProgressSaved,
    SensitiveProgressSaved,
    SensitiveProgressViewed,
    CertificateIssued,
    CertificateRevoked,
    EvidenceEncrypted,
    AuditPurged,
}

impl ActionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreated => "USER_CREATED",
            Self::UserDeleted => "USER_DELETED",
            Self::ProgressSaved => "PROGRESS_SAVED",
            Self::SensitiveProgressSaved => "SENSITIVE_PROGRESS_SAVED",
            Self::SensitiveProgressViewed => "SENSITIVE_PROGRESS_VIEWED",
            Self::CertificateIssued => "CERTIFICATE_ISSUED",
            Self::CertificateRevoked => "CERTIFICATE_REVOKED",
            Self::EvidenceEncrypted => "EVIDENCE_ENCRYPTED",
            Self::AuditPurged => "AUDIT_PURGED",
        }
    }
}

impl std::fmt::Display for ActionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionCode {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "USER_CREATED" => Self::UserCreated,
            "USER_DELETED" => Self::UserDeleted,
            "PROGRESS_SAVED" => Self::ProgressSaved,
            "SENSITIVE_PROGRESS_SAVED" => Self::SensitiveProgressSaved,
            "SENSITIVE_PROGRESS_VIEWED" => Self::SensitiveProgressViewed,
            "CERTIFICATE_ISSUED" => Self::CertificateIssued,
            "CERTIFICATE_REVOKED" => Self::CertificateRevoked,
            "EVIDENCE_ENCRYPTED" => Self::EvidenceEncrypted,
            "AUDIT_PURGED" => Self::AuditPurged,
            other => {
                return Err(ComplianceError::Format(format!(
                    "unknown audit action {other:?}"
                )));
            }
        })
    }
}

/// Render a timestamp in the fixed-width form stored in every table.
///
/// Fixed width means SQL text comparison orders the same way as time.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, failing with [`ComplianceError::Format`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ComplianceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ComplianceError::Format(format!("timestamp {raw:?}: {e}")))
}
