//! # Durable Store
//!
//! Postgres-backed cache ledger and task ledger.

pub mod postgres_store;

pub use postgres_store::PostgresStore;
