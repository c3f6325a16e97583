//! Machine registry and serial verification.
//!
//! Machines enter the registry either as anonymous placeholders identified
//! by a temporary code or as pre-known serial records. Wardens claim a
//! serial for a placeholder; admins approve or reject the claim, and
//! approval starts the warranty.

mod registry;
pub mod serial;
pub mod warranty;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod serial_tests;

use std::sync::Arc;

use chrono::NaiveDate;
use fieldops_core::Clock;
use fieldops_core::config::RegistryConfig;

use crate::storage::FieldDatabase;

pub use registry::{PreRegistrationOutcome, WardenPreRegistration, dedupe_serials, temp_code};
pub use serial::{ClaimSubmission, DEFAULT_REJECTION_REASON, ReviewAction, SerialState};
pub use warranty::Warranty;

#[derive(Clone)]
pub struct AssetService {
    db: FieldDatabase,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
}

impl AssetService {
    pub fn new(db: FieldDatabase, clock: Arc<dyn Clock>, config: RegistryConfig) -> Self {
        Self { db, clock, config }
    }

    fn today(&self) -> NaiveDate {
        warranty::today(self.clock.as_ref())
    }
}
