//! Phone one-time-code authentication and bearer sessions.
//!
//! [`AuthService`] issues and verifies login codes and resolves bearer
//! tokens to users. Codes and tokens are only ever stored as digests.

pub mod bearer;
pub mod credentials;
mod otp;
pub mod phone;
mod session;


use std::sync::Arc;

use fieldops_core::Clock;
use fieldops_core::config::AuthConfig;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};
use crate::storage::{FieldDatabase, Role, User};

pub use credentials::{CredentialHasher, Sha256Hasher};
pub use otp::{OTP_PURPOSE_LOGIN, OtpIssued, SessionIssued};

#[derive(Clone)]
pub struct AuthService {
    db: FieldDatabase,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn CredentialHasher>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: FieldDatabase, clock: Arc<dyn Clock>, config: AuthConfig) -> Self {
        Self {
            db,
            clock,
            hasher: Arc::new(Sha256Hasher),
            config,
        }
    }

    /// Swap the digest used for codes and tokens.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }
}

/// Refuse unless `actor` is active and holds `role`.
pub fn require_role(actor: &User, role: Role) -> ServiceResult<()> {
    if actor.is_active && actor.has_role(role) {
        return Ok(());
    }
    warn!(user_id = %actor.id, required = %role, "Authorization refused");
    Err(ServiceError::Forbidden(format!("{role} role required")))
}
