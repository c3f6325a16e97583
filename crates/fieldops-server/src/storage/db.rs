//! `SQLite` database for the `FieldOps` server.

pub use fieldops_core::db::DatabaseError;

fieldops_core::define_database!(FieldDatabase, "Field database migrations complete");
