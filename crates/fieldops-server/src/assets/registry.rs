//! Machine registry: warden pre-registration and assignment.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use super::AssetService;
use crate::auth::phone::{parse_phone, phone_suffix};
use crate::auth::require_role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{DatabaseError, Machine, Role, User, UserParams, WardenMachines};

/// Admin request to register a warden and hand them machines.
///
/// A non-empty `serials` list assigns existing serial records and wins over
/// `machine_count`, which creates that many placeholders instead.
#[derive(Debug, Clone, Default)]
pub struct WardenPreRegistration {
    pub full_name: String,
    pub phone: String,
    pub district_id: String,
    pub hostel_id: Option<String>,
    pub serials: Vec<String>,
    pub machine_count: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PreRegistrationOutcome {
    pub warden: User,
    pub assigned_serials: Vec<String>,
    pub assigned_temp_codes: Vec<String>,
}

/// Trim, drop blanks and duplicates, keep first-occurrence order.
pub fn dedupe_serials(serials: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    serials
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .map(str::to_string)
        .collect()
}

/// `TMP-<last 4 of phone>-<6-digit time fragment>-<1-based index>`.
pub fn temp_code(phone: &str, now: i64, index: u32) -> String {
    format!(
        "TMP-{}-{:06}-{index}",
        phone_suffix(phone),
        now.rem_euclid(1_000_000)
    )
}

enum Assignment {
    Known(Vec<Machine>),
    Placeholders(u32),
}

impl AssetService {
    #[instrument(skip_all, fields(op = "PreRegisterWarden", admin_id = %admin.id))]
    pub async fn pre_register_warden(
        &self,
        admin: &User,
        request: WardenPreRegistration,
    ) -> ServiceResult<PreRegistrationOutcome> {
        require_role(admin, Role::Admin)?;

        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(ServiceError::Validation("full name is required".into()));
        }
        let phone = parse_phone(&request.phone)?;
        let district_id = request.district_id.trim();
        if district_id.is_empty() {
            return Err(ServiceError::Validation("district is required".into()));
        }
        let hostel_id = request
            .hostel_id
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());

        let serials = dedupe_serials(&request.serials);
        let assignment = if !serials.is_empty() {
            let found = self.db.find_machines_by_serials(&serials).await?;
            let missing: Vec<String> = {
                let known: HashSet<&str> = found
                    .iter()
                    .filter_map(|m| m.serial_number.as_deref())
                    .collect();
                serials
                    .iter()
                    .filter(|s| !known.contains(s.as_str()))
                    .cloned()
                    .collect()
            };
            if !missing.is_empty() {
                return Err(ServiceError::SomeSerialsNotFound(missing));
            }
            Assignment::Known(found)
        } else {
            match request.machine_count {
                Some(n) if (1..=self.config.max_placeholders).contains(&n) => {
                    Assignment::Placeholders(n)
                }
                Some(_) => {
                    return Err(ServiceError::Validation(format!(
                        "machine count must be between 1 and {}",
                        self.config.max_placeholders
                    )));
                }
                None => {
                    return Err(ServiceError::Validation(
                        "either serial numbers or a machine count is required".into(),
                    ));
                }
            }
        };

        if let Some(existing) = self.db.get_user_by_phone(&phone).await? {
            if existing.has_role(Role::Admin) {
                return Err(ServiceError::Conflict(
                    "phone number belongs to an admin".into(),
                ));
            }
        }

        let now = self.clock.now_secs();
        let new_id = uuid::Uuid::new_v4().to_string();
        let params = UserParams {
            id: &new_id,
            full_name,
            phone: &phone,
            role: Role::Warden,
            district_id: Some(district_id),
            hostel_id,
        };

        let (assigned_serials, assigned_temp_codes, known_ids, slots) = match assignment {
            Assignment::Known(machines) => {
                let ids: Vec<String> = machines.into_iter().map(|m| m.id).collect();
                (serials, Vec::new(), ids, Vec::new())
            }
            Assignment::Placeholders(count) => {
                let codes: Vec<String> = (1..=count).map(|i| temp_code(&phone, now, i)).collect();
                let slots: Vec<(String, String)> = codes
                    .iter()
                    .map(|code| (uuid::Uuid::new_v4().to_string(), code.clone()))
                    .collect();
                (Vec::new(), codes, Vec::new(), slots)
            }
        };
        let machines = if slots.is_empty() {
            WardenMachines::Assign(&known_ids)
        } else {
            WardenMachines::Placeholders(&slots)
        };

        let (warden, role_change) = self
            .db
            .pre_register_warden(&params, machines, &admin.id, "Pre-registered as warden", now)
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueViolation(_) => {
                    warn!(phone = %phone_suffix(&phone), "Temporary code collision");
                    ServiceError::Conflict("temporary code already in use; retry".into())
                }
                other => other.into(),
            })?;

        if let Some(change) = role_change {
            info!(
                user_id = %warden.id,
                from = %change.from_role,
                to = %change.to_role,
                "Role changed by pre-registration"
            );
        }
        info!(
            warden_id = %warden.id,
            serials = assigned_serials.len(),
            placeholders = assigned_temp_codes.len(),
            "Warden pre-registered"
        );

        Ok(PreRegistrationOutcome {
            warden,
            assigned_serials,
            assigned_temp_codes,
        })
    }

    /// Create approved, unassigned machine records for serials known up
    /// front. Any serial already registered fails the whole call.
    #[instrument(skip_all, fields(op = "RegisterKnownSerials", admin_id = %admin.id))]
    pub async fn register_known_serials(
        &self,
        admin: &User,
        serials: &[String],
        district_id: Option<&str>,
    ) -> ServiceResult<Vec<Machine>> {
        require_role(admin, Role::Admin)?;

        let serials = dedupe_serials(serials);
        if serials.is_empty() {
            return Err(ServiceError::Validation(
                "at least one serial number is required".into(),
            ));
        }

        let existing = self.db.find_machines_by_serials(&serials).await?;
        if !existing.is_empty() {
            let taken: Vec<&str> = existing
                .iter()
                .filter_map(|m| m.serial_number.as_deref())
                .collect();
            return Err(ServiceError::Conflict(format!(
                "serial numbers already registered: {}",
                taken.join(", ")
            )));
        }

        let rows: Vec<(String, String)> = serials
            .into_iter()
            .map(|s| (uuid::Uuid::new_v4().to_string(), s))
            .collect();
        let district_id = district_id.map(str::trim).filter(|d| !d.is_empty());
        let created = self
            .db
            .create_serial_machines(&rows, district_id, &admin.id, self.clock.now_secs())
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueViolation(msg) => ServiceError::Conflict(msg),
                other => other.into(),
            })?;

        info!(count = created.len(), "Known serials registered");
        Ok(created)
    }

    /// Machines assigned to the calling warden, newest first.
    pub async fn list_assigned_machines(&self, warden: &User) -> ServiceResult<Vec<Machine>> {
        require_role(warden, Role::Warden)?;
        Ok(self.db.list_machines_for_warden(&warden.id).await?)
    }

    /// Claims waiting for review, oldest first.
    pub async fn list_pending_claims(&self, admin: &User) -> ServiceResult<Vec<Machine>> {
        require_role(admin, Role::Admin)?;
        Ok(self.db.list_pending_claims().await?)
    }
}
