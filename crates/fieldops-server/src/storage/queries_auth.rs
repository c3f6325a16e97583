//! One-time code and session queries for the `FieldOps` server.

use super::db::{DatabaseError, FieldDatabase};
use super::models::{AuthSession, OtpCode};

/// A freshly issued one-time code, already hashed.
#[derive(Debug, Clone, Copy)]
pub struct OtpParams<'a> {
    pub user_id: &'a str,
    pub phone: &'a str,
    pub code_hash: &'a str,
    pub purpose: &'a str,
    pub expires_at: i64,
}

/// A session to create alongside code consumption.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub token_hash: &'a str,
    pub expires_at: i64,
}

impl FieldDatabase {
    // =========================================================================
    // One-time code queries
    // =========================================================================

    /// Store a new code and supersede every open code for the same
    /// phone and purpose, in one transaction.
    pub async fn issue_otp_code(
        &self,
        params: &OtpParams<'_>,
        now: i64,
    ) -> Result<OtpCode, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r"
            UPDATE otp_codes SET superseded_at = ?
            WHERE phone = ? AND purpose = ?
              AND consumed_at IS NULL AND superseded_at IS NULL
            ",
        )
        .bind(now)
        .bind(params.phone)
        .bind(params.purpose)
        .execute(&mut *tx)
        .await?;

        let id = sqlx::query(
            r"
            INSERT INTO otp_codes (user_id, phone, code_hash, purpose, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.user_id)
        .bind(params.phone)
        .bind(params.code_hash)
        .bind(params.purpose)
        .bind(now)
        .bind(params.expires_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let code = sqlx::query_as::<_, OtpCode>("SELECT * FROM otp_codes WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(code)
    }

    /// The most recently issued code for a phone that is neither consumed
    /// nor superseded. Expiry is left to the caller.
    pub async fn latest_open_otp(
        &self,
        phone: &str,
        purpose: &str,
    ) -> Result<Option<OtpCode>, DatabaseError> {
        let code = sqlx::query_as::<_, OtpCode>(
            r"
            SELECT * FROM otp_codes
            WHERE phone = ? AND purpose = ?
              AND consumed_at IS NULL AND superseded_at IS NULL
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(phone)
        .bind(purpose)
        .fetch_optional(self.pool())
        .await?;

        Ok(code)
    }

    /// Claim one of the code's `max_attempts` guesses before the hash is
    /// compared, returning the new attempt count.
    ///
    /// Returns `None` once every guess is spent or the code is no longer
    /// open, so concurrent verifiers can never evaluate more than
    /// `max_attempts` guesses between them.
    pub async fn reserve_otp_attempt(
        &self,
        id: i64,
        max_attempts: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            UPDATE otp_codes SET attempts = attempts + 1
            WHERE id = ? AND attempts < ?
              AND consumed_at IS NULL AND superseded_at IS NULL
            RETURNING attempts
            ",
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(attempts,)| attempts))
    }

    /// Consume a code and create the session it unlocks, atomically.
    ///
    /// The attempt reserved for the matching guess is released, so the
    /// counter keeps only failed guesses. Returns `None` without writing
    /// anything if the code was consumed or superseded concurrently.
    pub async fn consume_otp_and_create_session(
        &self,
        otp_id: i64,
        session: &SessionParams<'_>,
        now: i64,
    ) -> Result<Option<AuthSession>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let consumed = sqlx::query(
            r"
            UPDATE otp_codes SET consumed_at = ?, attempts = MAX(attempts - 1, 0)
            WHERE id = ? AND consumed_at IS NULL AND superseded_at IS NULL
            ",
        )
        .bind(now)
        .bind(otp_id)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r"
            INSERT INTO auth_sessions (id, user_id, token_hash, created_at, expires_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.token_hash)
        .bind(now)
        .bind(session.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let created = sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE id = ?")
            .bind(session.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(created))
    }

    /// Get a code row by ID.
    pub async fn get_otp_code(&self, id: i64) -> Result<OtpCode, DatabaseError> {
        sqlx::query_as::<_, OtpCode>("SELECT * FROM otp_codes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("OTP code {id}")))
    }

    // =========================================================================
    // Session queries
    // =========================================================================

    /// Get a session by ID.
    pub async fn get_session(&self, id: &str) -> Result<AuthSession, DatabaseError> {
        sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Session {id}")))
    }

    /// Find a session by token hash, regardless of validity.
    pub async fn get_session_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<AuthSession>, DatabaseError> {
        let session =
            sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(self.pool())
                .await?;

        Ok(session)
    }

    /// Update session `last_seen_at`.
    pub async fn touch_session(&self, id: &str, now: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE auth_sessions SET last_seen_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Revoke a session by ID. Already-revoked sessions keep their original
    /// revocation time.
    pub async fn revoke_session(&self, id: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revoke all sessions for a user.
    pub async fn revoke_user_sessions(&self, user_id: &str, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
