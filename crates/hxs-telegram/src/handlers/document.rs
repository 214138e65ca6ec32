use std::sync::Arc;

use teloxide::{net::Download, prelude::*};

use hxs_core::{
    audit::AuditEvent,
    domain::{ChatId, PayloadArtifact, UserId},
    engine::SubmitOutcome,
    errors::Error,
};

use crate::{
    formatting::{error_html, rules_reply_html, transform_caption_html},
    router::AppState,
};

use super::reply;

async fn download_document(bot: &Bot, doc: &teloxide::types::Document) -> hxs_core::Result<Vec<u8>> {
    let file = bot
        .get_file(doc.file.id.clone())
        .await
        .map_err(|e| Error::External(format!("telegram get_file failed: {e}")))?;

    let mut buf: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| Error::External(format!("telegram download failed: {e}")))?;
    Ok(buf)
}

pub async fn handle_document(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(doc) = msg.document() else {
        return Ok(());
    };

    let owner = UserId(user.id.0 as i64);
    let chat_id = msg.chat.id.0;
    let file_name = doc
        .file_name
        .clone()
        .unwrap_or_else(|| "document".to_string());

    // File size gate, before anything is downloaded.
    let size = doc.file.size as u64;
    let max = state.engine.config().max_file_size;
    if size > max {
        reply(&state, chat_id, &error_html(&Error::SizeExceeded { size, max })).await;
        return Ok(());
    }

    let bytes = match download_document(&bot, doc).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(owner = %owner, file = %file_name, error = %e, "document download failed");
            reply(&state, chat_id, "❌ File download failed.").await;
            return Ok(());
        }
    };

    let artifact = PayloadArtifact::new(file_name.clone(), bytes);
    match state
        .engine
        .submit_artifact(owner, ChatId(chat_id), artifact)
        .await
    {
        Ok(SubmitOutcome::RulesAccepted(sub)) => {
            state
                .audit
                .record(AuditEvent::rules(owner, sub.accepted, sub.rejected.len()));
            reply(&state, chat_id, &rules_reply_html(&sub)).await;
        }
        Ok(SubmitOutcome::Transformed(out)) => {
            state.audit.record(AuditEvent::transform(
                owner,
                &file_name,
                out.rules_applied,
                out.patched_count(),
            ));

            let balance = state.engine.ledger().balance(owner).await;
            let caption = transform_caption_html(&out, balance);
            let name = out.name.clone();
            if let Err(e) = state
                .messenger
                .send_document(ChatId(chat_id), &name, out.bytes, Some(&caption))
                .await
            {
                tracing::warn!(owner = %owner, file = %name, error = %e, "failed to send result");
                reply(&state, chat_id, "❌ Failed to send the result file.").await;
            }
        }
        Err(e) => {
            state
                .audit
                .record(AuditEvent::failure(owner, &file_name, &e.to_string()));
            reply(&state, chat_id, &error_html(&e)).await;
        }
    }

    Ok(())
}
