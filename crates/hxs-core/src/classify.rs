//! Routing of incoming documents by declared name.

use crate::{
    archive::detect_archive_kind,
    domain::ArtifactKind,
    errors::Error,
    Result,
};

/// Suffixes that decide how a document is handled.
#[derive(Clone, Debug)]
pub struct Suffixes {
    pub payload: String,
    pub rule_list: String,
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            payload: ".dat".to_string(),
            rule_list: ".txt".to_string(),
        }
    }
}

/// Classify a document by file name. Archives win over the other suffixes.
pub fn classify(file_name: &str, suffixes: &Suffixes) -> Result<ArtifactKind> {
    if let Some(kind) = detect_archive_kind(file_name) {
        return Ok(ArtifactKind::Archive(kind));
    }
    if file_name.ends_with(&suffixes.payload) {
        return Ok(ArtifactKind::Payload);
    }
    if file_name.ends_with(&suffixes.rule_list) {
        return Ok(ArtifactKind::RuleList);
    }
    Err(Error::UnsupportedKind(file_name.to_string()))
}
