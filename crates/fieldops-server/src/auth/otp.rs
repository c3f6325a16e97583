//! Login code issuance and verification.

use std::fmt;

use tracing::field::Empty;
use tracing::{info, instrument, warn};

use super::AuthService;
use super::credentials::{generate_otp_code, generate_session_token, otp_material};
use super::phone::{normalize_phone, parse_phone, phone_suffix};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{OtpParams, Role, SessionParams, User};

pub const OTP_PURPOSE_LOGIN: &str = "LOGIN";

/// A code to hand to the delivery channel. Never logged.
pub struct OtpIssued {
    pub code: String,
    pub expires_at: i64,
}

impl fmt::Debug for OtpIssued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpIssued")
            .field("code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A freshly created session. `token` is the only plaintext copy.
pub struct SessionIssued {
    pub token: String,
    pub session_id: String,
    pub expires_at: i64,
    pub user: User,
}

impl fmt::Debug for SessionIssued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIssued")
            .field("token", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user.id)
            .finish()
    }
}

impl AuthService {
    /// Issue a login code for an active user.
    ///
    /// Any still-open code for the same phone is superseded.
    #[instrument(skip_all, fields(op = "RequestOtp", phone = Empty))]
    pub async fn request_otp(
        &self,
        phone: &str,
        expected_role: Option<Role>,
    ) -> ServiceResult<OtpIssued> {
        let phone = parse_phone(phone)?;
        tracing::Span::current().record("phone", phone_suffix(&phone));

        let user = self
            .db
            .get_user_by_phone(&phone)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ServiceError::NotRegistered)?;

        if let Some(expected) = expected_role {
            if !user.has_role(expected) {
                warn!(user_id = %user.id, %expected, "Login code requested for wrong role");
                return Err(ServiceError::RoleMismatch { expected });
            }
        }

        let code = generate_otp_code();
        let now = self.clock.now_secs();
        let expires_at = now + self.config.otp_ttl_secs;
        let code_hash = self.hasher.digest(&otp_material(&phone, &code));

        let issued = self
            .db
            .issue_otp_code(
                &OtpParams {
                    user_id: &user.id,
                    phone: &phone,
                    code_hash: &code_hash,
                    purpose: OTP_PURPOSE_LOGIN,
                    expires_at,
                },
                now,
            )
            .await?;

        info!(user_id = %user.id, otp_id = issued.id, expires_at, "Login code issued");

        Ok(OtpIssued { code, expires_at })
    }

    /// Exchange a login code for a bearer session.
    ///
    /// Every guess reserves an attempt before the hash is compared; a
    /// mismatch keeps it, a successful login hands it back. The count
    /// never resets. Consumption and session creation happen together or
    /// not at all.
    #[instrument(skip_all, fields(op = "VerifyOtp", phone = Empty))]
    pub async fn verify_otp(&self, phone: &str, code: &str) -> ServiceResult<SessionIssued> {
        let phone = normalize_phone(phone);
        tracing::Span::current().record("phone", phone_suffix(&phone));

        let otp = self
            .db
            .latest_open_otp(&phone, OTP_PURPOSE_LOGIN)
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active code for this phone number".into()))?;

        let now = self.clock.now_secs();
        if otp.is_expired_at(now) {
            return Err(ServiceError::Expired);
        }
        if otp.attempts >= self.config.otp_max_attempts {
            warn!(otp_id = otp.id, attempts = otp.attempts, "Login code locked");
            return Err(ServiceError::TooManyAttempts);
        }

        let Some(attempts) = self
            .db
            .reserve_otp_attempt(otp.id, self.config.otp_max_attempts)
            .await?
        else {
            let current = self.db.get_otp_code(otp.id).await?;
            if current.consumed_at.is_some() || current.superseded_at.is_some() {
                return Err(ServiceError::NotFound(
                    "No active code for this phone number".into(),
                ));
            }
            warn!(otp_id = otp.id, attempts = current.attempts, "Login code locked");
            return Err(ServiceError::TooManyAttempts);
        };

        if !self
            .hasher
            .verify(&otp_material(&phone, code.trim()), &otp.code_hash)
        {
            warn!(otp_id = otp.id, attempts, "Invalid login code");
            return Err(ServiceError::InvalidCode { attempts });
        }

        let user = self
            .db
            .get_user(&otp.user_id)
            .await
            .map_err(ServiceError::from_lookup)?;
        if !user.is_active {
            return Err(ServiceError::NotRegistered);
        }

        let token = generate_session_token();
        let session_id = uuid::Uuid::new_v4().to_string();
        let token_hash = self.hasher.digest(&token);

        let session = self
            .db
            .consume_otp_and_create_session(
                otp.id,
                &SessionParams {
                    id: &session_id,
                    user_id: &user.id,
                    token_hash: &token_hash,
                    expires_at: now + self.config.session_ttl_secs,
                },
                now,
            )
            .await?
            .ok_or_else(|| ServiceError::NotFound("No active code for this phone number".into()))?;

        info!(user_id = %user.id, session_id = %session.id, "Session issued");

        Ok(SessionIssued {
            token,
            session_id: session.id,
            expires_at: session.expires_at,
            user,
        })
    }
}
