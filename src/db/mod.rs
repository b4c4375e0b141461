//! Database module: the three durable stores behind the relay.
//!
//! - `model`: view models returned by multi-row queries.
//! - `repo`: SQL-only functions for the settings, stats and queue tables.
//!
//! Callers import from `tg_relaybot::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{QueueCounts, SenderActivity};
