use std::sync::Arc;

use teloxide::prelude::*;

use hxs_core::domain::{ChatId, UserId};

use crate::{
    formatting::{insufficient_credits_html, session_started_html, usage_html},
    router::AppState,
};

use super::reply;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let owner = UserId(user.id.0 as i64);
    let chat_id = msg.chat.id.0;
    let (cmd, _args) = parse_command(text);

    match cmd.as_str() {
        "start" | "help" => {
            let engine_cfg = state.engine.config();
            let html = usage_html(
                &engine_cfg.payload_suffix,
                &engine_cfg.rule_list_suffix,
                engine_cfg.idle_timeout,
            );
            reply(&state, chat_id, &html).await;
        }
        "swap" => {
            let cost = state.engine.config().transform_cost;
            let balance = state.engine.ledger().balance(owner).await;
            if balance < cost {
                reply(&state, chat_id, &insufficient_credits_html(cost, balance)).await;
                return Ok(());
            }
            state.engine.begin(owner, ChatId(chat_id)).await;
            tracing::info!(owner = %owner, "session started");
            reply(&state, chat_id, &session_started_html()).await;
        }
        "balance" => {
            let balance = state.engine.ledger().balance(owner).await;
            reply(&state, chat_id, &format!("💰 Balance: {balance} credit(s)")).await;
        }
        _ => {
            reply(&state, chat_id, "❓ Unknown command. Send /help for usage.").await;
        }
    }

    Ok(())
}
