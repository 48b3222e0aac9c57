// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the training core.

use thiserror::Error;

/// Top-level error type for all training-core operations.
#[derive(Debug, Error)]
pub enum ComplianceError {
    // -- Startup --
    #[error("configuration error: {0}")]
    Config(String),

    // -- Domain validation --
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("username already exists: {0}")]
    DuplicateUser(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("certificate {0} is already revoked")]
    AlreadyRevoked(String),

    // -- Cipher --
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("malformed data: {0}")]
    Format(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    // -- Reporting --
    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    // -- Audit trail --
    #[error("audit write failed: {0}")]
    AuditWrite(String),

    #[error("audit chain broken at entry {entry_id}: expected {expected}, got {actual}")]
    AuditChainBroken {
        entry_id: i64,
        expected: String,
        actual: String,
    },

    // -- Storage / persistence --
    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ComplianceError {
    /// Shorthand for a [`ComplianceError::Validation`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ComplianceError>;
