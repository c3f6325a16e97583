//! User directory: the first admin, field team registration, audited
//! role changes and deactivation.

use std::sync::Arc;

use fieldops_core::Clock;
use tracing::{info, instrument};

use crate::auth::phone::parse_phone;
use crate::auth::require_role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{DatabaseError, FieldDatabase, Role, RoleChange, User, UserParams};

#[derive(Clone)]
pub struct Directory {
    db: FieldDatabase,
    clock: Arc<dyn Clock>,
}

fn required<'a>(value: &'a str, what: &str) -> ServiceResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{what} is required")));
    }
    Ok(value)
}

impl Directory {
    pub fn new(db: FieldDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Create the first admin. Fails once any admin exists.
    #[instrument(skip_all, fields(op = "BootstrapAdmin"))]
    pub async fn bootstrap_admin(&self, full_name: &str, phone: &str) -> ServiceResult<User> {
        let full_name = required(full_name, "full name")?;
        let phone = parse_phone(phone)?;
        let id = uuid::Uuid::new_v4().to_string();

        let admin = self
            .db
            .create_first_admin(&id, full_name, &phone, self.clock.now_secs())
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueViolation(_) => {
                    ServiceError::Conflict("phone number is already registered".into())
                }
                other => other.into(),
            })?
            .ok_or_else(|| ServiceError::Conflict("an admin already exists".into()))?;

        info!(user_id = %admin.id, "Bootstrap admin created");
        Ok(admin)
    }

    /// Register (or re-register) a service manager, supervisor or
    /// monitoring official by phone.
    #[instrument(skip_all, fields(op = "RegisterTeamMember", admin_id = %admin.id, %role))]
    pub async fn register_team_member(
        &self,
        admin: &User,
        full_name: &str,
        phone: &str,
        role: Role,
        district_id: Option<&str>,
    ) -> ServiceResult<User> {
        require_role(admin, Role::Admin)?;
        if !role.is_team_role() {
            return Err(ServiceError::Validation(format!(
                "{role} cannot be registered as a team member"
            )));
        }
        let full_name = required(full_name, "full name")?;
        let phone = parse_phone(phone)?;

        if let Some(existing) = self.db.get_user_by_phone(&phone).await? {
            if existing.has_role(Role::Admin) {
                return Err(ServiceError::Conflict(
                    "phone number belongs to an admin".into(),
                ));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let reason = format!("Registered as {role}");
        let (user, change) = self
            .db
            .upsert_user_by_phone(
                &UserParams {
                    id: &id,
                    full_name,
                    phone: &phone,
                    role,
                    district_id: district_id.map(str::trim).filter(|d| !d.is_empty()),
                    hostel_id: None,
                },
                &admin.id,
                &reason,
                self.clock.now_secs(),
            )
            .await?;

        match change {
            Some(change) => info!(user_id = %user.id, from = %change.from_role, "Team member re-roled"),
            None => info!(user_id = %user.id, "Team member registered"),
        }
        Ok(user)
    }

    /// Move a user to another role, with an audit row.
    #[instrument(skip(self, admin, reason), fields(op = "ChangeRole", admin_id = %admin.id))]
    pub async fn change_role(
        &self,
        admin: &User,
        user_id: &str,
        new_role: Role,
        reason: &str,
    ) -> ServiceResult<(User, RoleChange)> {
        require_role(admin, Role::Admin)?;
        if user_id == admin.id {
            return Err(ServiceError::Forbidden(
                "admins cannot change their own role".into(),
            ));
        }
        let reason = required(reason, "reason")?;

        let current = self
            .db
            .get_user(user_id)
            .await
            .map_err(ServiceError::from_lookup)?;
        if current.has_role(new_role) {
            return Err(ServiceError::Conflict(format!(
                "user already has role {new_role}"
            )));
        }

        let (user, change) = self
            .db
            .change_user_role(user_id, new_role, &admin.id, reason, self.clock.now_secs())
            .await
            .map_err(ServiceError::from_lookup)?;

        info!(user_id, from = %change.from_role, to = %change.to_role, "Role changed");
        Ok((user, change))
    }

    /// Deactivate a user and revoke their sessions.
    #[instrument(skip(self, admin), fields(op = "DeactivateUser", admin_id = %admin.id))]
    pub async fn deactivate_user(&self, admin: &User, user_id: &str) -> ServiceResult<User> {
        require_role(admin, Role::Admin)?;
        if user_id == admin.id {
            return Err(ServiceError::Forbidden(
                "admins cannot deactivate themselves".into(),
            ));
        }

        let (user, revoked) = self
            .db
            .deactivate_user(user_id, self.clock.now_secs())
            .await
            .map_err(ServiceError::from_lookup)?;

        info!(user_id, revoked, "User deactivated");
        Ok(user)
    }

    /// Role transitions for a user, oldest first.
    pub async fn role_history(&self, admin: &User, user_id: &str) -> ServiceResult<Vec<RoleChange>> {
        require_role(admin, Role::Admin)?;
        Ok(self.db.list_role_changes(user_id).await?)
    }
}
