//! # Storage Module
//!
//! Durable state for a Harbor engine.
//!
//! ```text
//! db.rs  — HarborDB: sled trees for engine snapshots and round prices
//! ```
//!
//! The engine persists one snapshot of its whole state after every
//! committed transition, and appends each round's closing price to its own
//! tree so price history can be scanned without decoding a snapshot.
//! Values are bincode; JSON is for the API.

pub mod db;

pub use db::{DbError, DbResult, HarborDB};
