//! Background eviction of idle sessions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{ports::IdleNotifier, session::SessionStore};

#[derive(Clone, Copy, Debug)]
pub struct ReaperConfig {
    pub idle_timeout: Duration,
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10 * 60),
            interval: Duration::from_secs(60),
        }
    }
}

/// Evict every session idle as of `now` and notify its owner.
///
/// Only sessions this sweep actually removed are notified; a session consumed
/// by a transformation in the meantime is simply gone from the store.
pub async fn sweep(
    store: &SessionStore,
    notifier: &dyn IdleNotifier,
    now: Instant,
    idle_timeout: Duration,
) -> usize {
    let evicted = store.evict_idle(now, idle_timeout).await;
    for session in &evicted {
        tracing::info!(owner = %session.owner, rules = session.rules().len(), "idle session evicted");
        notifier
            .notify_idle_timeout(session.owner, session.reply)
            .await;
    }
    evicted.len()
}

/// Handle to the periodic sweep task. Stop it explicitly on shutdown.
pub struct IdleReaper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IdleReaper {
    pub fn start(
        store: Arc<SessionStore>,
        notifier: Arc<dyn IdleNotifier>,
        cfg: ReaperConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tok = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(cfg.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                  _ = tok.cancelled() => break,
                  _ = tick.tick() => {
                    let n = sweep(&store, notifier.as_ref(), Instant::now(), cfg.idle_timeout).await;
                    if n > 0 {
                      tracing::debug!(evicted = n, "reaper sweep finished");
                    }
                  }
                }
            }
        });

        tracing::info!(
            idle_timeout_secs = cfg.idle_timeout.as_secs(),
            interval_secs = cfg.interval.as_secs(),
            "idle reaper started"
        );
        Self { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "idle reaper task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatId, SwapRule, UserId};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        notified: Mutex<Vec<(UserId, ChatId)>>,
    }

    #[async_trait]
    impl IdleNotifier for Recorder {
        async fn notify_idle_timeout(&self, owner: UserId, reply: ChatId) {
            self.notified.lock().await.push((owner, reply));
        }
    }

    #[tokio::test]
    async fn sweep_notifies_only_evicted_sessions() {
        let store = SessionStore::new();
        let recorder = Recorder::default();
        let timeout = Duration::from_secs(60);
        let t0 = Instant::now();

        store.get_or_create_at(UserId(1), ChatId(10), t0).await;
        store.get_or_create_at(UserId(2), ChatId(20), t0).await;
        store
            .append_rules_at(UserId(2), &[SwapRule::new(1, 2)], t0)
            .await
            .unwrap();
        // Owner 2 triggers processing before the sweep runs.
        store.take_payload(UserId(2)).await.unwrap();

        let n = sweep(&store, &recorder, t0 + timeout, timeout).await;
        assert_eq!(n, 1);
        assert_eq!(
            *recorder.notified.lock().await,
            vec![(UserId(1), ChatId(10))]
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn sweep_keeps_recently_active_sessions() {
        let store = SessionStore::new();
        let recorder = Recorder::default();
        let timeout = Duration::from_secs(60);
        let t0 = Instant::now();

        store.get_or_create_at(UserId(1), ChatId(10), t0).await;
        let n = sweep(&store, &recorder, t0 + timeout / 2, timeout).await;
        assert_eq!(n, 0);
        assert!(recorder.notified.lock().await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn background_task_evicts_and_stops() {
        let store = Arc::new(SessionStore::new());
        let recorder = Arc::new(Recorder::default());
        store.get_or_create(UserId(5), ChatId(50)).await;

        let reaper = IdleReaper::start(
            store.clone(),
            recorder.clone(),
            ReaperConfig {
                idle_timeout: Duration::from_millis(30),
                interval: Duration::from_millis(10),
            },
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while !store.is_empty().await && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        reaper.stop().await;

        assert!(store.is_empty().await);
        assert_eq!(
            *recorder.notified.lock().await,
            vec![(UserId(5), ChatId(50))]
        );
    }
}
