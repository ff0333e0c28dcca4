//! Shutdown Log: a daily end-of-workday reflection journal.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod logs;
pub mod server;
pub mod store;
