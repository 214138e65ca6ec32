use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use hxs_core::{
    audit::AuditLogger, config::Config, engine::TransformEngine, messaging::port::MessagingPort,
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<TransformEngine>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
    pub audit: Arc<AuditLogger>,
}

/// One async lock per chat, so a chat's updates are handled in receipt order.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Poll Telegram until ctrl-c.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(
        allowed_users = state.cfg.telegram_allowed_users.len(),
        temp_dir = %state.cfg.engine.temp_dir.display(),
        "polling for updates"
    );

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("polling stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn chat_lock_serializes_same_chat_only() {
        let locks = ChatLocks::default();
        let guard = locks.lock_chat(1).await;

        // A different chat is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock_chat(2)).await;
        assert!(other.is_ok());

        // The same chat waits for the first guard.
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock_chat(1)).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock_chat(1)).await;
        assert!(same.is_ok());
    }
}
