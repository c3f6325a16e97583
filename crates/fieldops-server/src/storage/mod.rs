//! `SQLite` storage for the `FieldOps` server.
//!
//! Provides persistence for users, role audit rows, one-time codes,
//! sessions, and machines. Multi-row writes that must be all-or-nothing
//! run inside a single transaction here, never in the services.

mod db;
mod models;
mod queries;
mod queries_auth;
mod queries_machines;


pub use db::{DatabaseError, FieldDatabase};
pub use models::*;
pub use queries::UserParams;
pub use queries_auth::{OtpParams, SessionParams};
pub use queries_machines::{ApprovalParams, ClaimParams, WardenMachines, WarrantyParams};
