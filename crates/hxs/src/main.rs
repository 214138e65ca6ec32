use std::sync::Arc;

use teloxide::Bot;

use hxs_core::{
    audit::AuditLogger,
    config::Config,
    engine::TransformEngine,
    messaging::{notifier::MessengerIdleNotifier, port::MessagingPort},
    ports::{CreditLedger, IdleNotifier, MemoryLedger},
    reaper::IdleReaper,
    session::SessionStore,
};
use hxs_telegram::{
    router::{run_polling, AppState, ChatLocks},
    TelegramMessenger,
};

#[tokio::main]
async fn main() -> Result<(), hxs_core::Error> {
    hxs_core::logging::init("hxs")?;

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(SessionStore::new());
    let ledger: Arc<dyn CreditLedger> = Arc::new(MemoryLedger::new(cfg.starting_credits));
    let engine = Arc::new(TransformEngine::new(
        cfg.engine.clone(),
        store.clone(),
        ledger,
    ));
    let audit = Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    ));

    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let notifier: Arc<dyn IdleNotifier> =
        Arc::new(MessengerIdleNotifier::new(messenger.clone()).with_audit(audit.clone()));
    let reaper = IdleReaper::start(store, notifier, cfg.engine.reaper());

    let state = Arc::new(AppState {
        cfg,
        engine,
        messenger,
        chat_locks: Arc::new(ChatLocks::default()),
        audit,
    });

    let polled = run_polling(bot, state).await;
    reaper.stop().await;
    tracing::info!("shutdown complete");

    polled.map_err(|e| hxs_core::Error::External(format!("telegram bot failed: {e}")))?;
    Ok(())
}
