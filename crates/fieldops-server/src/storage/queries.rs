//! User and role-audit queries for the `FieldOps` server.

use sqlx::SqliteConnection;

use super::db::{DatabaseError, FieldDatabase};
use super::models::{Role, RoleChange, User};

/// Fields written when a user is created or upserted by phone.
#[derive(Debug, Clone, Copy)]
pub struct UserParams<'a> {
    /// Used only when no user owns the phone yet.
    pub id: &'a str,
    pub full_name: &'a str,
    pub phone: &'a str,
    pub role: Role,
    pub district_id: Option<&'a str>,
    pub hostel_id: Option<&'a str>,
}

impl FieldDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a user.
    pub async fn create_user(&self, params: &UserParams<'_>, now: i64) -> Result<User, DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO users
                (id, full_name, phone, role, district_id, hostel_id, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.full_name)
        .bind(params.phone)
        .bind(params.role.as_str())
        .bind(params.district_id)
        .bind(params.hostel_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(params.id).await
    }

    /// Create the first admin. Returns `None` once any admin exists.
    pub async fn create_first_admin(
        &self,
        id: &str,
        full_name: &str,
        phone: &str,
        now: i64,
    ) -> Result<Option<User>, DatabaseError> {
        let result = sqlx::query(
            r"
            INSERT INTO users (id, full_name, phone, role, is_active, created_at, updated_at)
            SELECT ?, ?, ?, 'ADMIN', 1, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM users WHERE role = 'ADMIN')
            ",
        )
        .bind(id)
        .bind(full_name)
        .bind(phone)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await.map(Some)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Get a user by canonical phone number.
    pub async fn get_user_by_phone(&self, phone: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = ?")
            .bind(phone)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    /// Insert or update the user owning `params.phone`.
    ///
    /// An existing user is reactivated and takes the new name and role;
    /// district and hostel are only overwritten when supplied. A role
    /// transition writes a `role_changes` row in the same transaction.
    pub async fn upsert_user_by_phone(
        &self,
        params: &UserParams<'_>,
        changed_by: &str,
        reason: &str,
        now: i64,
    ) -> Result<(User, Option<RoleChange>), DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let upserted = upsert_user(&mut tx, params, changed_by, reason, now).await?;
        tx.commit().await?;

        Ok(upserted)
    }

    /// Move a user to a new role and record the transition.
    pub async fn change_user_role(
        &self,
        user_id: &str,
        to_role: Role,
        changed_by: &str,
        reason: &str,
        now: i64,
    ) -> Result<(User, RoleChange), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {user_id}")))?;

        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(to_role.as_str())
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let change = insert_role_change(
            &mut tx,
            user_id,
            &existing.role,
            to_role,
            changed_by,
            reason,
            now,
        )
        .await?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((user, change))
    }

    /// Deactivate a user and revoke every live session they hold.
    ///
    /// Returns the updated user and the number of sessions revoked.
    pub async fn deactivate_user(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<(User, u64), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("User {user_id}")));
        }

        let revoked = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((user, revoked))
    }

    /// Role history for a user, oldest first.
    pub async fn list_role_changes(&self, user_id: &str) -> Result<Vec<RoleChange>, DatabaseError> {
        let changes = sqlx::query_as::<_, RoleChange>(
            "SELECT * FROM role_changes WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(changes)
    }
}

/// [`FieldDatabase::upsert_user_by_phone`] on a caller-owned transaction.
pub(super) async fn upsert_user(
    conn: &mut SqliteConnection,
    params: &UserParams<'_>,
    changed_by: &str,
    reason: &str,
    now: i64,
) -> Result<(User, Option<RoleChange>), DatabaseError> {
    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE phone = ?")
        .bind(params.phone)
        .fetch_optional(&mut *conn)
        .await?;

    let (user_id, role_change) = if let Some(existing) = existing {
        sqlx::query(
            r"
            UPDATE users
            SET full_name = ?, role = ?,
                district_id = COALESCE(?, district_id),
                hostel_id = COALESCE(?, hostel_id),
                is_active = 1, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(params.full_name)
        .bind(params.role.as_str())
        .bind(params.district_id)
        .bind(params.hostel_id)
        .bind(now)
        .bind(&existing.id)
        .execute(&mut *conn)
        .await?;

        let change = if existing.role == params.role.as_str() {
            None
        } else {
            Some(
                insert_role_change(
                    &mut *conn,
                    &existing.id,
                    &existing.role,
                    params.role,
                    changed_by,
                    reason,
                    now,
                )
                .await?,
            )
        };
        (existing.id, change)
    } else {
        sqlx::query(
            r"
            INSERT INTO users
                (id, full_name, phone, role, district_id, hostel_id, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.full_name)
        .bind(params.phone)
        .bind(params.role.as_str())
        .bind(params.district_id)
        .bind(params.hostel_id)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        (params.id.to_string(), None)
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok((user, role_change))
}

async fn insert_role_change(
    conn: &mut SqliteConnection,
    user_id: &str,
    from_role: &str,
    to_role: Role,
    changed_by: &str,
    reason: &str,
    now: i64,
) -> Result<RoleChange, DatabaseError> {
    let id = sqlx::query(
        r"
        INSERT INTO role_changes (user_id, from_role, to_role, changed_by, reason, changed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(user_id)
    .bind(from_role)
    .bind(to_role.as_str())
    .bind(changed_by)
    .bind(reason)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let change = sqlx::query_as::<_, RoleChange>("SELECT * FROM role_changes WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(change)
}
