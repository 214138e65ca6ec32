use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the core only needs plain replies and
/// document delivery.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<()>;
}
