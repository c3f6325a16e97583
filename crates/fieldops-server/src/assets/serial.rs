//! Serial verification state machine.
//!
//! ```text
//! UNCLAIMED --claim--> PENDING --approve--> APPROVED
//!                         |  ^
//!                  reject |  | claim
//!                         v  |
//!                       REJECTED
//! ```
//!
//! `APPROVED` is terminal: it can be neither re-claimed nor re-reviewed.
//! Only the manual warranty path touches an approved machine, and it never
//! changes the serial.

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use super::AssetService;
use super::warranty::{self, Warranty};
use crate::auth::require_role;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{
    ApprovalParams, ClaimParams, DatabaseError, Machine, Role, SerialStatus, User, WarrantyParams,
};

pub const DEFAULT_REJECTION_REASON: &str = "Serial number could not be verified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialState {
    Unclaimed,
    Pending,
    Approved,
    Rejected,
}

impl SerialState {
    pub fn of(machine: &Machine) -> Self {
        match machine.serial_status() {
            None => Self::Unclaimed,
            Some(SerialStatus::Pending) => Self::Pending,
            Some(SerialStatus::Approved) => Self::Approved,
            Some(SerialStatus::Rejected) => Self::Rejected,
        }
    }

    /// State after a warden submits a claim.
    pub fn claim(self) -> ServiceResult<Self> {
        match self {
            Self::Approved => Err(ServiceError::AlreadyApproved),
            Self::Unclaimed | Self::Pending | Self::Rejected => Ok(Self::Pending),
        }
    }

    /// State after an admin review.
    pub fn review(self, approve: bool) -> ServiceResult<Self> {
        match self {
            Self::Approved => Err(ServiceError::AlreadyApproved),
            _ if approve => Ok(Self::Approved),
            _ => Ok(Self::Rejected),
        }
    }

    /// Whether the manual warranty path may re-date this machine.
    pub fn refresh_warranty(self) -> ServiceResult<Self> {
        match self {
            Self::Approved => Ok(Self::Approved),
            _ => Err(ServiceError::NotYetApproved),
        }
    }
}

/// A warden's claim on a placeholder machine.
#[derive(Debug, Clone, Copy)]
pub struct ClaimSubmission<'a> {
    pub temp_code: &'a str,
    pub claimed_serial: &'a str,
    pub install_date: NaiveDate,
    pub notes: Option<&'a str>,
    pub hostel_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum ReviewAction {
    /// Approve, optionally overriding the claimed serial.
    Approve { approved_serial: Option<String> },
    Reject { reason: Option<String> },
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn check_install_date(install_date: NaiveDate, today: NaiveDate) -> ServiceResult<()> {
    if install_date > today {
        return Err(ServiceError::Validation(
            "installation date cannot be in the future".into(),
        ));
    }
    Ok(())
}

impl AssetService {
    /// Claim a serial for a placeholder assigned to `warden`.
    #[instrument(skip(self, warden, claim), fields(op = "SubmitClaim", warden_id = %warden.id, temp_code = %claim.temp_code))]
    pub async fn submit_claim(
        &self,
        warden: &User,
        claim: ClaimSubmission<'_>,
    ) -> ServiceResult<Machine> {
        require_role(warden, Role::Warden)?;

        let claimed_serial = non_blank(Some(claim.claimed_serial))
            .ok_or_else(|| ServiceError::Validation("serial number is required".into()))?;
        check_install_date(claim.install_date, self.today())?;

        let machine = self
            .db
            .get_machine_by_temp_code(claim.temp_code.trim())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Machine {}", claim.temp_code)))?;
        if !machine.is_assigned_to(&warden.id) {
            warn!(machine_id = %machine.id, "Claim on a machine assigned elsewhere");
            return Err(ServiceError::Forbidden(
                "machine is not assigned to you".into(),
            ));
        }
        SerialState::of(&machine).claim()?;

        let updated = self
            .db
            .record_claim(
                &ClaimParams {
                    machine_id: &machine.id,
                    warden_id: &warden.id,
                    claimed_serial,
                    install_date: claim.install_date,
                    notes: non_blank(claim.notes),
                    hostel_id: non_blank(claim.hostel_id),
                },
                self.clock.now_secs(),
            )
            .await?;

        match updated {
            Some(machine) => {
                info!(machine_id = %machine.id, claimed_serial, "Serial claim submitted");
                Ok(machine)
            }
            None => Err(self.lost_race(&machine.id, &warden.id).await),
        }
    }

    /// Approve or reject the claim on a machine.
    #[instrument(skip(self, admin, action), fields(op = "ReviewClaim", admin_id = %admin.id))]
    pub async fn review_claim(
        &self,
        admin: &User,
        machine_id: &str,
        action: ReviewAction,
    ) -> ServiceResult<Machine> {
        require_role(admin, Role::Admin)?;

        let machine = self
            .db
            .get_machine(machine_id)
            .await
            .map_err(ServiceError::from_lookup)?;
        let state = SerialState::of(&machine);
        let now = self.clock.now_secs();

        match action {
            ReviewAction::Reject { reason } => {
                state.review(false)?;
                let reason = non_blank(reason.as_deref()).unwrap_or(DEFAULT_REJECTION_REASON);
                let machine = self
                    .db
                    .record_rejection(machine_id, reason, &admin.id, now)
                    .await?
                    .ok_or(ServiceError::AlreadyApproved)?;

                info!(machine_id, reason, "Serial claim rejected");
                Ok(machine)
            }
            ReviewAction::Approve { approved_serial } => {
                state.review(true)?;
                let serial = non_blank(approved_serial.as_deref())
                    .or_else(|| non_blank(machine.claimed_serial.as_deref()))
                    .ok_or(ServiceError::NoSerialAvailable)?;
                let install_date = machine
                    .claimed_install_date
                    .ok_or(ServiceError::MissingInstallDate)?;
                let warranty = warranty::compute(install_date, self.today())?;

                let approved = self
                    .db
                    .record_approval(
                        &ApprovalParams {
                            machine_id,
                            serial_number: serial,
                            reviewer_id: &admin.id,
                            installation_date: install_date,
                            warranty_start: warranty.start,
                            warranty_end: warranty.end,
                            warranty_status: warranty.status,
                            warranty_claimed_by: machine.warden_id.as_deref(),
                        },
                        now,
                    )
                    .await
                    .map_err(|e| serial_conflict(e, serial))?
                    .ok_or(ServiceError::AlreadyApproved)?;

                info!(
                    machine_id,
                    serial,
                    warranty_end = %warranty.end,
                    warranty_status = warranty.status.as_str(),
                    "Serial approved"
                );
                Ok(approved)
            }
        }
    }

    /// Re-date the warranty of an approved machine from a warden's
    /// installation date.
    #[instrument(skip(self, warden), fields(op = "ManualWarrantyClaim", warden_id = %warden.id))]
    pub async fn manual_warranty_claim(
        &self,
        warden: &User,
        serial: &str,
        install_date: NaiveDate,
        hostel_id: Option<&str>,
    ) -> ServiceResult<Machine> {
        require_role(warden, Role::Warden)?;

        let today = self.today();
        check_install_date(install_date, today)?;

        let serial = serial.trim();
        let machine = self
            .db
            .get_machine_by_serial(serial)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Machine with serial {serial}")))?;
        if !machine.is_assigned_to(&warden.id) {
            return Err(ServiceError::Forbidden(
                "machine is not assigned to you".into(),
            ));
        }
        SerialState::of(&machine).refresh_warranty()?;

        let Warranty { start, end, status } = warranty::compute(install_date, today)?;
        let updated = self
            .db
            .record_manual_warranty(
                &WarrantyParams {
                    machine_id: &machine.id,
                    warden_id: &warden.id,
                    installation_date: install_date,
                    warranty_start: start,
                    warranty_end: end,
                    warranty_status: status,
                    hostel_id: non_blank(hostel_id),
                },
                self.clock.now_secs(),
            )
            .await?
            .ok_or(ServiceError::NotYetApproved)?;

        warn!(
            machine_id = %updated.id,
            serial,
            previous_installation_date = ?machine.installation_date,
            installation_date = %install_date,
            warranty_end = %end,
            "Warranty re-dated by warden"
        );
        Ok(updated)
    }

    /// Explain why a guarded claim update matched no row.
    async fn lost_race(&self, machine_id: &str, warden_id: &str) -> ServiceError {
        match self.db.get_machine(machine_id).await {
            Ok(m) if SerialState::of(&m) == SerialState::Approved => ServiceError::AlreadyApproved,
            Ok(m) if !m.is_assigned_to(warden_id) => {
                ServiceError::Forbidden("machine is not assigned to you".into())
            }
            Ok(_) => ServiceError::Conflict("machine changed concurrently; retry".into()),
            Err(e) => ServiceError::from_lookup(e),
        }
    }
}

fn serial_conflict(e: DatabaseError, serial: &str) -> ServiceError {
    if e.is_unique_violation() {
        warn!(serial, "Serial already registered to another machine");
        ServiceError::SerialConflict(serial.to_string())
    } else {
        e.into()
    }
}
