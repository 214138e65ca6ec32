//! Core domain + application logic for the hex swap bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the credit
//! ledger live behind ports (traits) implemented in adapter crates.

pub mod archive;
pub mod audit;
pub mod classify;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod patch;
pub mod ports;
pub mod reaper;
pub mod rules;
pub mod session;

pub use errors::{Error, Result};
