//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - checks authorization
//! - turns the update into an engine call
//! - replies with the outcome

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use hxs_core::{audit::AuditEvent, domain::UserId};

use crate::router::AppState;
mod commands;
mod document;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(user_id) = msg.from().map(|u| u.id.0 as i64) else {
        return Ok(());
    };

    if !state.cfg.is_authorized(user_id) {
        state.audit.record(AuditEvent::denied(UserId(user_id)));
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    // Sequentialize everything per chat so rules land before the file that follows them.
    let _guard = state.chat_locks.lock_chat(chat_id).await;

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(bot, msg, state).await;
    }

    if msg.document().is_some() {
        return document::handle_document(bot, msg, state).await;
    }

    Ok(())
}

async fn reply(state: &AppState, chat_id: i64, html: &str) {
    if let Err(e) = state
        .messenger
        .send_html(hxs_core::domain::ChatId(chat_id), html)
        .await
    {
        tracing::warn!(chat_id, error = %e, "failed to send reply");
    }
}
