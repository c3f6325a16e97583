//! Shared fixtures for service test modules.
//!
//! Every fixture runs against a fresh in-memory database and a
//! [`ManualClock`] pinned to [`T0`].

use std::sync::Arc;

use chrono::NaiveDate;
use fieldops_core::{Clock, ManualClock};
use fieldops_core::config::{AuthConfig, RegistryConfig};

use crate::assets::{AssetService, PreRegistrationOutcome, WardenPreRegistration};
use crate::auth::{AuthService, SessionIssued};
use crate::directory::Directory;
use crate::storage::{FieldDatabase, Role, User, UserParams};

/// 2026-06-01T00:00:00Z
pub const T0: i64 = 1_780_272_000;

pub const ADMIN_PHONE: &str = "9000000001";
pub const WARDEN_PHONE: &str = "9000000002";

pub struct TestEnv {
    pub db: FieldDatabase,
    pub clock: Arc<ManualClock>,
    pub auth: AuthService,
    pub assets: AssetService,
    pub directory: Directory,
}

impl TestEnv {
    pub async fn new() -> Self {
        let db = FieldDatabase::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(T0));
        Self {
            auth: AuthService::new(db.clone(), clock.clone(), AuthConfig::default()),
            assets: AssetService::new(db.clone(), clock.clone(), RegistryConfig::default()),
            directory: Directory::new(db.clone(), clock.clone()),
            db,
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    /// The bootstrap admin.
    pub async fn admin(&self) -> User {
        self.directory
            .bootstrap_admin("Asha Admin", ADMIN_PHONE)
            .await
            .unwrap()
    }

    /// Insert a user directly, bypassing admin checks.
    pub async fn user(&self, id: &str, phone: &str, role: Role) -> User {
        self.db
            .create_user(
                &UserParams {
                    id,
                    full_name: id,
                    phone,
                    role,
                    district_id: Some("d1"),
                    hostel_id: None,
                },
                T0,
            )
            .await
            .unwrap()
    }

    /// Pre-register a warden with `count` placeholder machines.
    pub async fn warden_with_placeholders(
        &self,
        admin: &User,
        phone: &str,
        count: u32,
    ) -> PreRegistrationOutcome {
        self.assets
            .pre_register_warden(
                admin,
                WardenPreRegistration {
                    full_name: format!("Warden {phone}"),
                    phone: phone.to_string(),
                    district_id: "d1".into(),
                    hostel_id: Some("h1".into()),
                    machine_count: Some(count),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    /// Request and verify a login code.
    pub async fn login(&self, phone: &str) -> SessionIssued {
        let issued = self.auth.request_otp(phone, None).await.unwrap();
        self.auth.verify_otp(phone, &issued.code).await.unwrap()
    }
}

/// A six-digit code guaranteed not to equal `code`.
pub fn wrong_code(code: &str) -> String {
    if code == "000000" {
        "000001".into()
    } else {
        "000000".into()
    }
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// `Authorization` header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
