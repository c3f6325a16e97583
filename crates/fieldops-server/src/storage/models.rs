//! Data models for `FieldOps` storage.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed set of user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Warden,
    ServiceManager,
    ServiceSupervisor,
    MonitoringOfficial,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Warden => "WARDEN",
            Self::ServiceManager => "SERVICE_MANAGER",
            Self::ServiceSupervisor => "SERVICE_SUPERVISOR",
            Self::MonitoringOfficial => "MONITORING_OFFICIAL",
        }
    }

    /// Roles that join through team registration.
    pub const fn is_team_role(self) -> bool {
        matches!(
            self,
            Self::ServiceManager | Self::ServiceSupervisor | Self::MonitoringOfficial
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "WARDEN" => Ok(Self::Warden),
            "SERVICE_MANAGER" => Ok(Self::ServiceManager),
            "SERVICE_SUPERVISOR" => Ok(Self::ServiceSupervisor),
            "MONITORING_OFFICIAL" => Ok(Self::MonitoringOfficial),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Review status of a machine's serial number. Absent means unclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerialStatus {
    Pending,
    Approved,
    Rejected,
}

impl SerialStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyStatus {
    Active,
    Expired,
}

impl WarrantyStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub phone: String,
    pub role: String,
    pub district_id: Option<String>,
    pub hostel_id: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role.as_str()
    }

    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleChange {
    pub id: i64,
    pub user_id: String,
    pub from_role: String,
    pub to_role: String,
    pub changed_by: String,
    pub reason: String,
    pub changed_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpCode {
    pub id: i64,
    pub user_id: String,
    pub phone: String,
    pub code_hash: String,
    pub purpose: String,
    pub attempts: i64,
    pub created_at: i64,
    pub expires_at: i64,
    pub consumed_at: Option<i64>,
    pub superseded_at: Option<i64>,
}

impl OtpCode {
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub last_seen_at: i64,
}

impl AuthSession {
    /// Not revoked and not yet expired.
    pub const fn is_valid_at(&self, now: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Machine {
    pub id: String,
    pub temp_code: Option<String>,
    pub serial_number: Option<String>,
    pub warden_id: Option<String>,
    pub district_id: Option<String>,
    pub hostel_id: Option<String>,
    pub uploaded_by: Option<String>,
    pub serial_status: Option<String>,
    pub claimed_serial: Option<String>,
    pub claimed_install_date: Option<NaiveDate>,
    pub claim_notes: Option<String>,
    pub claimed_at: Option<i64>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub installation_date: Option<NaiveDate>,
    pub warranty_status: Option<String>,
    pub warranty_start: Option<NaiveDate>,
    pub warranty_end: Option<NaiveDate>,
    pub warranty_claimed_by: Option<String>,
    pub warranty_claimed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Machine {
    pub fn serial_status(&self) -> Option<SerialStatus> {
        self.serial_status.as_deref().and_then(SerialStatus::parse)
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.warden_id.as_deref() == Some(user_id)
    }
}
