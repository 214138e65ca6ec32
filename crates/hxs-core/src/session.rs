//! Per-owner transformation sessions.
//!
//! Sessions live in a striped map: an owner always hashes to the same shard,
//! and every operation on that owner runs under the shard's lock, so operations
//! for one owner are linearizable while unrelated owners rarely contend.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::{
    domain::{ChatId, SwapRule, UserId},
    errors::Error,
    Result,
};

const DEFAULT_SHARDS: usize = 16;

/// Where a session stands in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Started, but no rule has been accepted yet.
    CollectingRules,
    /// At least one rule collected; a payload may now trigger the transformation.
    ReadyForPayload { rules: Vec<SwapRule> },
}

#[derive(Clone, Debug)]
pub struct TransformSession {
    pub owner: UserId,
    pub reply: ChatId,
    pub last_activity: Instant,
    pub phase: SessionPhase,
}

impl TransformSession {
    fn new(owner: UserId, reply: ChatId, now: Instant) -> Self {
        Self {
            owner,
            reply,
            last_activity: now,
            phase: SessionPhase::CollectingRules,
        }
    }

    pub fn rules(&self) -> &[SwapRule] {
        match &self.phase {
            SessionPhase::CollectingRules => &[],
            SessionPhase::ReadyForPayload { rules } => rules,
        }
    }

    fn push_rules(&mut self, rules: &[SwapRule]) {
        if rules.is_empty() {
            return;
        }
        if let SessionPhase::ReadyForPayload { rules: existing } = &mut self.phase {
            existing.extend_from_slice(rules);
        } else {
            self.phase = SessionPhase::ReadyForPayload {
                rules: rules.to_vec(),
            };
        }
    }

    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }
}

/// A session removed from the store by [`SessionStore::take_payload`].
///
/// Only exists with a non-empty rule sequence.
#[derive(Clone, Debug)]
pub struct TakenSession {
    pub owner: UserId,
    pub reply: ChatId,
    pub rules: Vec<SwapRule>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub total: usize,
}

pub struct SessionStore {
    shards: Vec<Mutex<HashMap<UserId, TransformSession>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shards(n: usize) -> Self {
        let n = n.max(1);
        Self {
            shards: (0..n).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, owner: UserId) -> &Mutex<HashMap<UserId, TransformSession>> {
        let idx = (owner.0.unsigned_abs() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    /// Return the owner's session, creating an empty one if none exists.
    ///
    /// An existing session keeps its rules; its activity time and reply chat are refreshed.
    pub async fn get_or_create(&self, owner: UserId, reply: ChatId) -> TransformSession {
        self.get_or_create_at(owner, reply, Instant::now()).await
    }

    pub async fn get_or_create_at(
        &self,
        owner: UserId,
        reply: ChatId,
        now: Instant,
    ) -> TransformSession {
        let mut map = self.shard(owner).lock().await;
        let session = map.entry(owner).or_insert_with(|| {
            tracing::debug!(owner = %owner, "session created");
            TransformSession::new(owner, reply, now)
        });
        session.reply = reply;
        session.last_activity = now;
        session.clone()
    }

    pub async fn append_rules(&self, owner: UserId, rules: &[SwapRule]) -> Result<AppendOutcome> {
        self.append_rules_at(owner, rules, Instant::now()).await
    }

    pub async fn append_rules_at(
        &self,
        owner: UserId,
        rules: &[SwapRule],
        now: Instant,
    ) -> Result<AppendOutcome> {
        let mut map = self.shard(owner).lock().await;
        let session = map.get_mut(&owner).ok_or(Error::NoActiveSession)?;
        session.last_activity = now;
        session.push_rules(rules);

        Ok(AppendOutcome {
            appended: rules.len(),
            total: session.rules().len(),
        })
    }

    /// Append rules, creating the session first if the owner has none.
    ///
    /// Creation and append happen under one lock, so a concurrent eviction
    /// cannot land in between.
    pub async fn append_rules_or_create(
        &self,
        owner: UserId,
        reply: ChatId,
        rules: &[SwapRule],
    ) -> AppendOutcome {
        let now = Instant::now();
        let mut map = self.shard(owner).lock().await;
        let session = map
            .entry(owner)
            .or_insert_with(|| TransformSession::new(owner, reply, now));
        session.reply = reply;
        session.last_activity = now;
        session.push_rules(rules);

        AppendOutcome {
            appended: rules.len(),
            total: session.rules().len(),
        }
    }

    /// Atomically remove the owner's session for exclusive use by the caller.
    ///
    /// A session still collecting rules is left untouched and reported as
    /// [`Error::EmptyRuleSet`].
    pub async fn take_payload(&self, owner: UserId) -> Result<TakenSession> {
        let mut map = self.shard(owner).lock().await;
        match map.get(&owner).map(|s| &s.phase) {
            None => return Err(Error::NoActiveSession),
            Some(SessionPhase::CollectingRules) => return Err(Error::EmptyRuleSet),
            Some(SessionPhase::ReadyForPayload { .. }) => {}
        }

        let Some(session) = map.remove(&owner) else {
            return Err(Error::NoActiveSession);
        };
        let SessionPhase::ReadyForPayload { rules } = session.phase else {
            return Err(Error::EmptyRuleSet);
        };
        Ok(TakenSession {
            owner: session.owner,
            reply: session.reply,
            rules,
        })
    }

    /// Refresh the owner's activity time. Returns `false` if no session exists.
    pub async fn touch(&self, owner: UserId) -> bool {
        self.touch_at(owner, Instant::now()).await
    }

    pub async fn touch_at(&self, owner: UserId, now: Instant) -> bool {
        let mut map = self.shard(owner).lock().await;
        match map.get_mut(&owner) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    pub async fn evict(&self, owner: UserId) -> Option<TransformSession> {
        self.shard(owner).lock().await.remove(&owner)
    }

    /// Remove and return every session idle for at least `timeout` as of `now`.
    ///
    /// The idle check and the removal happen under the same shard lock.
    pub async fn evict_idle(&self, now: Instant, timeout: Duration) -> Vec<TransformSession> {
        let mut evicted = Vec::new();
        for shard in &self.shards {
            let mut map = shard.lock().await;
            let idle: Vec<UserId> = map
                .values()
                .filter(|s| s.is_idle(now, timeout))
                .map(|s| s.owner)
                .collect();
            evicted.extend(idle.into_iter().filter_map(|owner| map.remove(&owner)));
        }
        evicted
    }

    pub async fn get(&self, owner: UserId) -> Option<TransformSession> {
        self.shard(owner).lock().await.get(&owner).cloned()
    }

    pub async fn len(&self) -> usize {
        let mut n = 0;
        for shard in &self.shards {
            n += shard.lock().await.len();
        }
        n
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
