// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for the store's unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use hipaa_core::{Clock, EncryptionSecret, FixedClock, TrainingConfig, TrainingSettings};

use crate::db::{Database, SharedDatabase, shared};

const TEST_KEY: &str = "unit-test-secret-0123456789abcdef0123";
const TEST_SALT: &str = "unit-test-salt-0001";

pub(crate) fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
}

/// Defaults with a cheap KDF so tests stay fast.
pub(crate) fn test_config() -> TrainingConfig {
    test_config_at(PathBuf::from("data/unit-test.db"))
}

pub(crate) fn test_config_at(database_path: PathBuf) -> TrainingConfig {
    let settings = TrainingSettings {
        database_path,
        kdf_iterations: 1_000,
        ..TrainingSettings::default()
    };
    TrainingConfig::new(settings, EncryptionSecret::new(TEST_KEY, TEST_SALT).unwrap()).unwrap()
}

pub(crate) fn memory_db() -> (Database, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(day_zero()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let db = Database::open_in_memory_with_clock(&test_config(), dyn_clock).unwrap();
    (db, clock)
}

pub(crate) fn shared_memory_db() -> (SharedDatabase, Arc<FixedClock>) {
    let (db, clock) = memory_db();
    (shared(db), clock)
}
