// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 fingerprints and the audit hash chain.

use hipaa_core::error::ComplianceError;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that `data` matches the expected SHA-256 hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), ComplianceError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(ComplianceError::Integrity(format!(
            "expected digest {expected_hex}, got {actual}"
        )))
    }
}

/// Checksum of one audit-chain link.
///
/// Each field is length-prefixed so that moving bytes between adjacent
/// fields changes the digest. The first entry in a chain has no predecessor.
pub fn chain_checksum(previous: Option<&str>, fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    let previous = previous.unwrap_or("");
    hasher.update((previous.len() as u64).to_be_bytes());
    hasher.update(previous.as_bytes());
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
