use std::sync::Arc;

use teloxide::prelude::*;

use hxs_core::{
    audit::AuditEvent,
    domain::{ChatId, UserId},
};

use crate::{formatting::rules_reply_html, router::AppState};

use super::reply;

/// Plain text is only meaningful as rules for an active session; anything
/// else is ignored.
pub async fn handle_text(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let owner = UserId(user.id.0 as i64);
    let chat_id = msg.chat.id.0;

    if !state.engine.has_session(owner).await {
        tracing::debug!(owner = %owner, "text without session ignored");
        return Ok(());
    }

    let sub = state.engine.submit_rules(owner, ChatId(chat_id), text).await;
    state
        .audit
        .record(AuditEvent::rules(owner, sub.accepted, sub.rejected.len()));
    reply(&state, chat_id, &rules_reply_html(&sub)).await;

    Ok(())
}
