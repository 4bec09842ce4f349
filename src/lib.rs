//! Backup orchestration for the patient records platform.
//!
//! The crate snapshots the Postgres database with `pg_dump`, mirrors the
//! application's image bucket into a manifest-carrying archive, ships both
//! artifacts to a durable backup bucket and exposes manual trigger/status
//! endpoints next to a daily schedule.

pub mod backup;
pub mod config;
pub mod errors;
pub mod scheduler;
pub mod server;
pub mod storage;
