//! Relays media sent privately by trusted senders into one destination chat,
//! throttled and captioned according to run-time policy.

pub mod caption;
pub mod channel;
pub mod commands;
pub mod config;
pub mod db;
pub mod debounce;
pub mod handlers;
pub mod model;
pub mod relay;
pub mod staging;
