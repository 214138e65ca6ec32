use std::fmt;

/// Telegram user id (numeric). Sessions are keyed by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). Where replies for a session are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An `(original, replacement)` pair naming two 4-byte windows to exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapRule {
    pub original: u64,
    pub replacement: u64,
}

impl SwapRule {
    pub fn new(original: u64, replacement: u64) -> Self {
        Self {
            original,
            replacement,
        }
    }

    pub fn value(&self, side: PatternSide) -> u64 {
        match side {
            PatternSide::Original => self.original,
            PatternSide::Replacement => self.replacement,
        }
    }
}

/// Which half of a [`SwapRule`] a pattern came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternSide {
    Original,
    Replacement,
}

impl fmt::Display for PatternSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternSide::Original => f.write_str("original"),
            PatternSide::Replacement => f.write_str("replacement"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

/// Declared kind of an incoming document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    Payload,
    Archive(ArchiveKind),
    RuleList,
}

/// A submitted document held in memory for the duration of one request.
#[derive(Clone, Debug)]
pub struct PayloadArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PayloadArtifact {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Output of the patch engine for one buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchResult {
    pub bytes: Vec<u8>,
    pub applied: usize,
}
