use crate::domain::PatternSide;

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the bot
/// core can handle failures consistently (user-facing message vs internal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("no active session")]
    NoActiveSession,

    #[error("session has no swap rules yet")]
    EmptyRuleSet,

    #[error("artifact too large: {size} bytes (max {max})")]
    SizeExceeded { size: u64, max: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedKind(String),

    #[error("failed to unpack archive: {0}")]
    UnpackFailed(String),

    #[error("rule {}: {which} pattern not found", .rule_index + 1)]
    PatternNotFound {
        /// Zero-based position of the rule in the session's sequence.
        rule_index: usize,
        which: PatternSide,
    },

    #[error("rule {}: value {value} does not fit in 4 bytes", .rule_index + 1)]
    InvalidPattern { rule_index: usize, value: u64 },

    #[error("failed to repack archive: {0}")]
    RepackFailed(String),

    #[error("insufficient credits (need {needed})")]
    InsufficientCredits { needed: u64 },
}

impl Error {
    /// Errors whose `Display` text is safe and useful to show to the sender.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::External(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
