//! Service-level error taxonomy.
//!
//! Every variant except [`ServiceError::Storage`] is recoverable and is
//! reported to the caller with a stable code.

use crate::storage::{DatabaseError, Role};

/// Coarse error families callers map to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationFailure,
    NotFound,
    Forbidden,
    Conflict,
    RateLimited,
    Expired,
    /// Storage unavailable; the only non-recoverable kind.
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("No active account is registered for this phone number")]
    NotRegistered,

    #[error("This account is not registered as {expected}")]
    RoleMismatch { expected: Role },

    #[error("The code has expired; request a new one")]
    Expired,

    #[error("Too many failed attempts; request a new code")]
    TooManyAttempts,

    #[error("Incorrect code ({attempts} failed attempts)")]
    InvalidCode { attempts: i64 },

    #[error("Serial number is already approved for this machine")]
    AlreadyApproved,

    #[error("Serial number has not been approved yet")]
    NotYetApproved,

    #[error("No serial number available to approve")]
    NoSerialAvailable,

    #[error("The claim has no installation date")]
    MissingInstallDate,

    #[error("Serial number {0} is already registered to another machine")]
    SerialConflict(String),

    #[error("Serial numbers not found: {}", .0.join(", "))]
    SomeSerialsNotFound(Vec<String>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl ServiceError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NoSerialAvailable | Self::MissingInstallDate => {
                ErrorKind::ValidationFailure
            }
            Self::NotFound(_) | Self::NotRegistered | Self::SomeSerialsNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Forbidden(_) | Self::RoleMismatch { .. } | Self::InvalidCode { .. } => {
                ErrorKind::Forbidden
            }
            Self::AlreadyApproved
            | Self::NotYetApproved
            | Self::SerialConflict(_)
            | Self::Conflict(_) => ErrorKind::Conflict,
            Self::TooManyAttempts => ErrorKind::RateLimited,
            Self::Expired => ErrorKind::Expired,
            Self::Storage(_) => ErrorKind::Unavailable,
        }
    }

    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::RoleMismatch { .. } => "ROLE_MISMATCH",
            Self::Expired => "EXPIRED",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::InvalidCode { .. } => "INVALID_CODE",
            Self::AlreadyApproved => "ALREADY_APPROVED",
            Self::NotYetApproved => "NOT_YET_APPROVED",
            Self::NoSerialAvailable => "NO_SERIAL_AVAILABLE",
            Self::MissingInstallDate => "MISSING_INSTALL_DATE",
            Self::SerialConflict(_) => "SERIAL_CONFLICT",
            Self::SomeSerialsNotFound(_) => "SERIALS_NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Translate a storage lookup miss into a caller-facing `NotFound`.
    pub(crate) fn from_lookup(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
