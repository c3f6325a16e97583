//! `FieldOps` Core Library
//!
//! Shared functionality for `FieldOps` components:
//! - `SQLite` pool setup, migrations and storage error types
//! - Configuration resolution and hierarchy
//! - An injectable clock for expiry and warranty checks
//! - Tracing subscriber initialisation

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
