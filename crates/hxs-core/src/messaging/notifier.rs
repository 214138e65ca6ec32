use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    audit::{AuditEvent, AuditLogger},
    domain::{ChatId, UserId},
    messaging::port::MessagingPort,
    ports::IdleNotifier,
};

pub const IDLE_TIMEOUT_MESSAGE: &str =
    "❌ Session timed out and was closed. Send /swap to start again.";

/// Delivers idle-timeout notices through a [`MessagingPort`].
pub struct MessengerIdleNotifier {
    messenger: Arc<dyn MessagingPort>,
    audit: Option<Arc<AuditLogger>>,
}

impl MessengerIdleNotifier {
    pub fn new(messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            messenger,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }
}

#[async_trait]
impl IdleNotifier for MessengerIdleNotifier {
    async fn notify_idle_timeout(&self, owner: UserId, reply: ChatId) {
        if let Some(audit) = &self.audit {
            audit.record(AuditEvent::idle_timeout(owner));
        }
        if let Err(e) = self.messenger.send_html(reply, IDLE_TIMEOUT_MESSAGE).await {
            tracing::warn!(owner = %owner, error = %e, "failed to deliver idle-timeout notice");
        }
    }
}
