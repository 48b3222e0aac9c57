// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! hipaa-security: cryptographic foundation for the training store.
//!
//! Field-level and streaming encryption for sensitive checklist data and
//! evidence attachments, plus the hash-chained audit trail that every
//! mutation in the store writes into.

pub mod audit;
pub mod cipher;
pub mod integrity;
pub mod sql;

// PUBLIC API: Re-export core security primitives
pub use audit::{AuditEntry, AuditLogger, normalize_origin};
pub use cipher::Cipher;
pub use integrity::{chain_checksum, hash_bytes, verify_hash};
