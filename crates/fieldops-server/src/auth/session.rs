//! Bearer session resolution and revocation.

use tracing::{debug, info, instrument};

use super::bearer::bearer_token;
use super::{AuthService, require_role};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{DatabaseError, Role, User};

impl AuthService {
    /// Resolve an `Authorization` header value to its user.
    ///
    /// Missing, malformed, unknown, revoked and expired tokens, and tokens of
    /// deactivated users, all resolve to `Ok(None)`. Only storage failures
    /// are errors.
    #[instrument(skip_all, fields(op = "Authenticate"))]
    pub async fn authenticate(&self, authorization: Option<&str>) -> ServiceResult<Option<User>> {
        let Some(token) = bearer_token(authorization) else {
            return Ok(None);
        };

        let token_hash = self.hasher.digest(token);
        let Some(session) = self.db.get_session_by_hash(&token_hash).await? else {
            return Ok(None);
        };

        let now = self.clock.now_secs();
        if !session.is_valid_at(now) {
            debug!(session_id = %session.id, "Session revoked or expired");
            return Ok(None);
        }

        let user = match self.db.get_user(&session.user_id).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            debug!(user_id = %user.id, "Session belongs to a deactivated user");
            return Ok(None);
        }

        self.db.touch_session(&session.id, now).await?;

        Ok(Some(user))
    }

    /// Like [`authenticate`](Self::authenticate), but a missing session is
    /// an error.
    pub async fn require_user(&self, authorization: Option<&str>) -> ServiceResult<User> {
        self.authenticate(authorization)
            .await?
            .ok_or_else(|| ServiceError::Forbidden("A valid session is required".into()))
    }

    /// Revoke one session. Returns `false` if it was already revoked.
    #[instrument(skip(self, admin), fields(op = "RevokeSession", admin_id = %admin.id))]
    pub async fn revoke_session(&self, admin: &User, session_id: &str) -> ServiceResult<bool> {
        require_role(admin, Role::Admin)?;

        self.db
            .get_session(session_id)
            .await
            .map_err(ServiceError::from_lookup)?;
        let revoked = self
            .db
            .revoke_session(session_id, self.clock.now_secs())
            .await?;

        if revoked {
            info!(session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Revoke every live session a user holds.
    #[instrument(skip(self, admin), fields(op = "RevokeUserSessions", admin_id = %admin.id))]
    pub async fn revoke_user_sessions(&self, admin: &User, user_id: &str) -> ServiceResult<u64> {
        require_role(admin, Role::Admin)?;

        self.db
            .get_user(user_id)
            .await
            .map_err(ServiceError::from_lookup)?;
        let count = self
            .db
            .revoke_user_sessions(user_id, self.clock.now_secs())
            .await?;

        info!(user_id, count, "User sessions revoked");
        Ok(count)
    }
}
