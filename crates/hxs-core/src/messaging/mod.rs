//! Outbound messaging abstractions (Telegram today).

pub mod notifier;
pub mod port;
