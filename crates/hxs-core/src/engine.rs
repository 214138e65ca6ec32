//! Entry points the messaging layer calls: submit rules, submit a document.

use std::{path::Path, sync::Arc};

use crate::{
    archive::{process_archive, EntryOutcome, EntryReport},
    classify::classify,
    config::EngineConfig,
    domain::{ArtifactKind, ChatId, PayloadArtifact, UserId},
    errors::Error,
    patch::patch,
    ports::CreditLedger,
    rules::{parse_rules, RejectedLine},
    session::{SessionStore, TakenSession, TransformSession},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSubmission {
    pub accepted: usize,
    /// Rules in the session after this submission (0 when no session exists).
    pub total: usize,
    pub rejected: Vec<RejectedLine>,
}

#[derive(Clone, Debug)]
pub struct TransformedArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
    pub rules_applied: usize,
    /// Per-entry report for archives; empty for a single payload.
    pub entries: Vec<EntryReport>,
    pub cost: u64,
}

impl TransformedArtifact {
    /// Files the rules were applied to: 1 for a single payload.
    pub fn patched_count(&self) -> usize {
        if self.entries.is_empty() {
            return 1;
        }
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Patched { .. }))
            .count()
    }
}

#[derive(Clone, Debug)]
pub enum SubmitOutcome {
    RulesAccepted(RuleSubmission),
    Transformed(TransformedArtifact),
}

pub struct TransformEngine {
    cfg: EngineConfig,
    store: Arc<SessionStore>,
    ledger: Arc<dyn CreditLedger>,
}

impl TransformEngine {
    pub fn new(cfg: EngineConfig, store: Arc<SessionStore>, ledger: Arc<dyn CreditLedger>) -> Self {
        Self { cfg, store, ledger }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    pub fn ledger(&self) -> Arc<dyn CreditLedger> {
        self.ledger.clone()
    }

    /// Open (or refresh) the owner's rule-collection phase.
    pub async fn begin(&self, owner: UserId, reply: ChatId) -> TransformSession {
        self.store.get_or_create(owner, reply).await
    }

    pub async fn has_session(&self, owner: UserId) -> bool {
        self.store.get(owner).await.is_some()
    }

    /// Parse `raw_text` and append the valid rules to the owner's session.
    ///
    /// A text with at least one valid rule creates the session if needed; a
    /// text with none only refreshes an existing session.
    pub async fn submit_rules(&self, owner: UserId, reply: ChatId, raw_text: &str) -> RuleSubmission {
        let parsed = parse_rules(raw_text);

        let total = if parsed.accepted.is_empty() {
            self.store.touch(owner).await;
            self.store
                .get(owner)
                .await
                .map(|s| s.rules().len())
                .unwrap_or(0)
        } else {
            self.store
                .append_rules_or_create(owner, reply, &parsed.accepted)
                .await
                .total
        };

        tracing::info!(
            owner = %owner,
            accepted = parsed.accepted.len(),
            rejected = parsed.rejected.len(),
            total,
            "rules submitted"
        );

        RuleSubmission {
            accepted: parsed.accepted.len(),
            total,
            rejected: parsed.rejected,
        }
    }

    /// Route a document: rule lists feed the session, payloads and archives
    /// consume it.
    ///
    /// Classification and size errors leave the session untouched. Once the
    /// session has been taken, it is gone whether the transformation succeeds
    /// or fails.
    pub async fn submit_artifact(
        &self,
        owner: UserId,
        reply: ChatId,
        artifact: PayloadArtifact,
    ) -> Result<SubmitOutcome> {
        let kind = classify(&artifact.name, &self.cfg.suffixes())?;

        let size = artifact.size();
        if size > self.cfg.max_file_size {
            return Err(Error::SizeExceeded {
                size,
                max: self.cfg.max_file_size,
            });
        }

        if kind == ArtifactKind::RuleList {
            let text = String::from_utf8_lossy(&artifact.bytes);
            let submission = self.submit_rules(owner, reply, &text).await;
            return Ok(SubmitOutcome::RulesAccepted(submission));
        }

        let taken = self.store.take_payload(owner).await?;
        let file_name = artifact.name.clone();

        match self.transform(kind, taken, artifact).await {
            Ok(out) => {
                tracing::info!(
                    owner = %owner,
                    file = %file_name,
                    rules = out.rules_applied,
                    entries = out.entries.len(),
                    "transformation finished"
                );
                Ok(SubmitOutcome::Transformed(out))
            }
            Err(e) => {
                tracing::warn!(owner = %owner, file = %file_name, error = %e, "transformation failed");
                Err(e)
            }
        }
    }

    async fn transform(
        &self,
        kind: ArtifactKind,
        taken: TakenSession,
        artifact: PayloadArtifact,
    ) -> Result<TransformedArtifact> {
        let settings = self.cfg.archive_settings();
        let rules = taken.rules;
        let rules_applied = rules.len();
        let name = output_name(&artifact.name);

        let (bytes, entries) = tokio::task::spawn_blocking(move || match kind {
            ArtifactKind::Archive(archive_kind) => {
                process_archive(&artifact.bytes, archive_kind, &rules, &settings)
                    .map(|out| (out.bytes, out.entries))
            }
            _ => patch(&artifact.bytes, &rules).map(|out| (out.bytes, Vec::new())),
        })
        .await
        .map_err(|e| Error::External(format!("transformation task failed: {e}")))??;

        let cost = self.cfg.transform_cost;
        if cost > 0 && !self.ledger.try_debit(taken.owner, cost).await {
            return Err(Error::InsufficientCredits { needed: cost });
        }

        Ok(TransformedArtifact {
            name,
            bytes,
            rules_applied,
            entries,
            cost,
        })
    }
}

/// `modified_<original file name>`, directories stripped.
pub fn output_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| original.to_string());
    format!("modified_{base}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::SwapRule,
        ports::MemoryLedger,
        rules::RejectReason,
    };
    use std::io::{Cursor, Read, Write};
    use zip::{write::FileOptions, ZipArchive, ZipWriter};

    const OWNER: UserId = UserId(11);
    const CHAT: ChatId = ChatId(1100);

    fn enc(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn engine_with(credits: u64, temp_dir: &Path) -> TransformEngine {
        let cfg = EngineConfig {
            temp_dir: temp_dir.to_path_buf(),
            transform_cost: 1,
            ..EngineConfig::default()
        };
        TransformEngine::new(
            cfg,
            Arc::new(SessionStore::new()),
            Arc::new(MemoryLedger::new(credits)),
        )
    }

    fn build_zip(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zw.start_file(*name, FileOptions::default()).unwrap();
            zw.write_all(data).unwrap();
        }
        zw.finish().unwrap().into_inner()
    }

    fn transformed(outcome: SubmitOutcome) -> TransformedArtifact {
        match outcome {
            SubmitOutcome::Transformed(t) => t,
            other => panic!("expected transformation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rules_then_payload_swaps_windows() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());

        let sub = engine.submit_rules(OWNER, CHAT, "100 200\n300 400").await;
        assert_eq!(sub.accepted, 2);
        assert_eq!(sub.total, 2);
        assert!(sub.rejected.is_empty());

        let mut input = Vec::new();
        let x = input.len();
        input.extend_from_slice(&enc(100));
        input.extend_from_slice(b"----");
        input.extend_from_slice(&enc(200));
        input.extend_from_slice(b"----");
        let y = input.len();
        input.extend_from_slice(&enc(300));
        input.extend_from_slice(b"----");
        input.extend_from_slice(&enc(400));

        let out = transformed(
            engine
                .submit_artifact(OWNER, CHAT, PayloadArtifact::new("save.dat", input))
                .await
                .unwrap(),
        );
        assert_eq!(&out.bytes[x..x + 4], &enc(200));
        assert_eq!(&out.bytes[y..y + 4], &enc(400));
        assert_eq!(out.name, "modified_save.dat");
        assert_eq!(out.rules_applied, 2);
        assert_eq!(out.cost, 1);

        assert!(!engine.has_session(OWNER).await);
        assert_eq!(engine.ledger().balance(OWNER).await, 4);
    }

    #[tokio::test]
    async fn invalid_rules_create_no_session() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());

        let sub = engine.submit_rules(OWNER, CHAT, "abc 5").await;
        assert_eq!(sub.accepted, 0);
        assert_eq!(sub.total, 0);
        assert_eq!(sub.rejected.len(), 1);
        assert_eq!(sub.rejected[0].line, 1);
        assert_eq!(sub.rejected[0].reason, RejectReason::InvalidNumber);
        assert!(!engine.has_session(OWNER).await);
    }

    #[tokio::test]
    async fn payload_without_session_or_rules_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());
        let artifact = || PayloadArtifact::new("save.dat", enc(1).to_vec());

        let err = engine
            .submit_artifact(OWNER, CHAT, artifact())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoActiveSession));

        engine.begin(OWNER, CHAT).await;
        let err = engine
            .submit_artifact(OWNER, CHAT, artifact())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRuleSet));
        assert!(engine.has_session(OWNER).await);
    }

    #[tokio::test]
    async fn unsupported_and_oversized_inputs_leave_session_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            temp_dir: tmp.path().to_path_buf(),
            max_file_size: 16,
            ..EngineConfig::default()
        };
        let engine = TransformEngine::new(
            cfg,
            Arc::new(SessionStore::new()),
            Arc::new(MemoryLedger::new(5)),
        );
        engine.submit_rules(OWNER, CHAT, "1 2").await;

        let err = engine
            .submit_artifact(OWNER, CHAT, PayloadArtifact::new("pic.png", vec![0; 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedKind(_)));

        let err = engine
            .submit_artifact(OWNER, CHAT, PayloadArtifact::new("big.dat", vec![0; 17]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SizeExceeded { size: 17, max: 16 }));

        let session = engine.store().get(OWNER).await.unwrap();
        assert_eq!(session.rules(), &[SwapRule::new(1, 2)]);
    }

    #[tokio::test]
    async fn rule_list_document_appends_rules() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());
        engine.submit_rules(OWNER, CHAT, "1 2").await;

        let outcome = engine
            .submit_artifact(
                OWNER,
                CHAT,
                PayloadArtifact::new("codes.txt", b"3 4\nbad line here\n5 6\n".to_vec()),
            )
            .await
            .unwrap();
        let SubmitOutcome::RulesAccepted(sub) = outcome else {
            panic!("expected rules");
        };
        assert_eq!(sub.accepted, 2);
        assert_eq!(sub.total, 3);
        assert_eq!(sub.rejected[0].line, 2);
    }

    #[tokio::test]
    async fn archive_failure_is_all_or_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());
        engine.submit_rules(OWNER, CHAT, "100 200").await;

        let good = [enc(100), enc(200)].concat();
        let bad = [enc(100), enc(7)].concat();
        let input = build_zip(&[
            ("a.dat", good),
            ("b.dat", bad),
            ("notes.txt", b"hello".to_vec()),
        ]);

        let err = engine
            .submit_artifact(OWNER, CHAT, PayloadArtifact::new("bundle.zip", input))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PatternNotFound { rule_index: 0, .. }));

        // Session consumed, scratch removed, nothing charged.
        assert!(!engine.has_session(OWNER).await);
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
        assert_eq!(engine.ledger().balance(OWNER).await, 5);
    }

    #[tokio::test]
    async fn archive_success_repacks_and_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(5, tmp.path());
        engine.submit_rules(OWNER, CHAT, "100 200").await;

        let input = build_zip(&[
            ("a.dat", [enc(100), enc(200)].concat()),
            ("notes.txt", b"hello".to_vec()),
        ]);

        let out = transformed(
            engine
                .submit_artifact(OWNER, CHAT, PayloadArtifact::new("bundle.zip", input))
                .await
                .unwrap(),
        );
        assert_eq!(out.name, "modified_bundle.zip");
        assert_eq!(out.entries[0].outcome, EntryOutcome::Patched { rules: 1 });
        assert_eq!(out.entries[1].outcome, EntryOutcome::PassedThrough);
        assert_eq!(out.patched_count(), 1);

        let mut zip = ZipArchive::new(Cursor::new(out.bytes)).unwrap();
        let mut data = Vec::new();
        zip.by_name("a.dat").unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, [enc(200), enc(100)].concat());
    }

    #[tokio::test]
    async fn refused_debit_withholds_result() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_with(0, tmp.path());
        engine.submit_rules(OWNER, CHAT, "1 2").await;

        let input = [enc(1), enc(2)].concat();
        let err = engine
            .submit_artifact(OWNER, CHAT, PayloadArtifact::new("save.dat", input))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientCredits { needed: 1 }));
        assert!(!engine.has_session(OWNER).await);
    }

    #[tokio::test]
    async fn default_config_transforms_without_credits() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = EngineConfig {
            temp_dir: tmp.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let engine = TransformEngine::new(
            cfg,
            Arc::new(SessionStore::new()),
            Arc::new(MemoryLedger::new(0)),
        );
        engine.submit_rules(OWNER, CHAT, "1 2").await;

        let out = transformed(
            engine
                .submit_artifact(
                    OWNER,
                    CHAT,
                    PayloadArtifact::new("save.dat", [enc(1), enc(2)].concat()),
                )
                .await
                .unwrap(),
        );
        assert_eq!(out.bytes, [enc(2), enc(1)].concat());
        assert_eq!(out.cost, 0);
        assert_eq!(engine.ledger().balance(OWNER).await, 0);
    }

    #[test]
    fn output_name_strips_directories() {
        assert_eq!(output_name("save.dat"), "modified_save.dat");
        assert_eq!(output_name("dir/bundle.tar.gz"), "modified_bundle.tar.gz");
    }
}
