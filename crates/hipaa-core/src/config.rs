// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Built once at process start and handed to each component constructor.
// Validation happens here, so a bad value is a single startup error rather
// than a failure on first use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ComplianceError, Result};

/// Minimum length of the encryption secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;
/// Minimum length of the key-derivation salt, in bytes.
pub const MIN_SALT_LEN: usize = 16;
/// HIPAA requires six years of audit history.
pub const MIN_AUDIT_RETENTION_YEARS: u32 = 6;

/// Non-secret settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Directory where compliance reports are written.
    pub reports_dir: PathBuf,
    /// Minimum quiz score (percent) that counts as a pass.
    pub pass_threshold: f64,
    /// Days between certificate issuance and expiry.
    pub certificate_validity_days: u32,
    /// Years audit entries are retained before they may be purged.
    pub audit_retention_years: u32,
    /// PBKDF2 iteration count for field-key derivation.
    pub kdf_iterations: u32,
    /// Largest evidence attachment accepted for encryption.
    pub max_evidence_bytes: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/hipaa_training.db"),
            reports_dir: PathBuf::from("reports"),
            pass_threshold: 80.0,
            certificate_validity_days: 365,
            audit_retention_years: 7,
            kdf_iterations: 600_000,
            max_evidence_bytes: 10 * 1024 * 1024,
        }
    }
}

impl TrainingSettings {
    pub fn validate(&self) -> Result<()> {
        if !(50.0..=100.0).contains(&self.pass_threshold) {
            return Err(ComplianceError::Config(format!(
                "PASS_THRESHOLD must be 50-100, got {}",
                self.pass_threshold
            )));
        }
        if self.certificate_validity_days < 1 {
            return Err(ComplianceError::Config(
                "TRAINING_EXPIRY_DAYS must be >= 1".into(),
            ));
        }
        if self.audit_retention_years < MIN_AUDIT_RETENTION_YEARS {
            return Err(ComplianceError::Config(format!(
                "AUDIT_RETENTION_YEARS must be >= {MIN_AUDIT_RETENTION_YEARS} for HIPAA compliance"
            )));
        }
        if self.kdf_iterations == 0 {
            return Err(ComplianceError::Config(
                "HIPAA_KDF_ITERATIONS must be positive".into(),
            ));
        }
        if self
            .database_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ComplianceError::Config(format!(
                "path traversal in DB_URL: {}",
                self.database_path.display()
            )));
        }
        Ok(())
    }
}

/// Encryption secret and salt. Never serialised, never printed.
#[derive(Clone)]
pub struct EncryptionSecret {
    key: Vec<u8>,
    salt: Vec<u8>,
}

impl EncryptionSecret {
    pub fn new(key: impl Into<String>, salt: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let salt = salt.into();
        let key = key.trim();
        let salt = salt.trim();

        if key.is_empty() {
            return Err(ComplianceError::Config(
                "HIPAA_ENCRYPTION_KEY is required".into(),
            ));
        }
        if key.len() < MIN_SECRET_LEN {
            return Err(ComplianceError::Config(format!(
                "HIPAA_ENCRYPTION_KEY must be >= {MIN_SECRET_LEN} characters"
            )));
        }
        if salt.is_empty() {
            return Err(ComplianceError::Config("HIPAA_SALT is required".into()));
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(ComplianceError::Config(format!(
                "HIPAA_SALT must be >= {MIN_SALT_LEN} characters"
            )));
        }

        Ok(Self {
            key: key.as_bytes().to_vec(),
            salt: salt.as_bytes().to_vec(),
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

impl std::fmt::Debug for EncryptionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSecret")
            .field("key", &"<redacted>")
            .field("salt", &"<redacted>")
            .finish()
    }
}

/// Validated configuration for the whole core.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    settings: TrainingSettings,
    secret: EncryptionSecret,
}

impl TrainingConfig {
    pub fn new(settings: TrainingSettings, secret: EncryptionSecret) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, secret })
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value. Unset optional values fall back to the defaults; an unset
    /// secret or salt is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = TrainingSettings::default();

        if let Some(path) = lookup("DB_URL") {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("REPORTS_DIR") {
            settings.reports_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, "PASS_THRESHOLD")? {
            settings.pass_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "TRAINING_EXPIRY_DAYS")? {
            settings.certificate_validity_days = v;
        }
        if let Some(v) = parse_var(&lookup, "AUDIT_RETENTION_YEARS")? {
            settings.audit_retention_years = v;
        }
        if let Some(v) = parse_var(&lookup, "HIPAA_KDF_ITERATIONS")? {
            settings.kdf_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_EVIDENCE_BYTES")? {
            settings.max_evidence_bytes = v;
        }

        let key = lookup("HIPAA_ENCRYPTION_KEY").ok_or_else(|| {
            ComplianceError::Config(
                "HIPAA_ENCRYPTION_KEY required; generate one with at least 32 random characters"
                    .into(),
            )
        })?;
        let salt = lookup("HIPAA_SALT")
            .ok_or_else(|| ComplianceError::Config("HIPAA_SALT required".into()))?;

        Self::new(settings, EncryptionSecret::new(key, salt)?)
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    pub fn secret(&self) -> &EncryptionSecret {
        &self.secret
    }

    pub fn database_path(&self) -> &Path {
        &self.settings.database_path
    }

    pub fn reports_dir(&self) -> &Path {
        &self.settings.reports_dir
    }

    pub fn pass_threshold(&self) -> f64 {
        self.settings.pass_threshold
    }

    pub fn certificate_validity_days(&self) -> u32 {
        self.settings.certificate_validity_days
    }

    pub fn audit_retention_years(&self) -> u32 {
        self.settings.audit_retention_years
    }

    pub fn kdf_iterations(&self) -> u32 {
        self.settings.kdf_iterations
    }

    pub fn max_evidence_bytes(&self) -> u64 {
        self.settings.max_evidence_bytes
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ComplianceError::Config(format!("{name}={raw:?}: {e}"))),
    }
}
