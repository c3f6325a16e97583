//! `FieldOps` Server Library
//!
//! Core functionality for field operations:
//! - Phone one-time-code login and bearer sessions
//! - Machine registry with serial verification and warranty tracking
//! - User directory with audited role changes
//! - `SQLite` storage for users, codes, sessions and machines

pub mod assets;
pub mod auth;
pub mod directory;
pub mod error;
pub mod storage;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test_helpers;

pub use assets::AssetService;
pub use auth::AuthService;
pub use directory::Directory;
pub use error::{ErrorKind, ServiceError, ServiceResult};
