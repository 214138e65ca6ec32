//! Reply texts (Telegram HTML).

use std::time::Duration;

use hxs_core::{
    engine::{RuleSubmission, TransformedArtifact},
    errors::Error,
};

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `90s` → `1m 30s`, `600s` → `10m`.
pub fn format_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if mins > 0 {
        parts.push(format!("{mins}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

pub fn usage_html(payload_suffix: &str, rule_list_suffix: &str, idle_timeout: Duration) -> String {
    format!(
        "🛠 <b>Hex swap bot</b>\n\n\
         1. Send /swap to start a session.\n\
         2. Send swap rules, one per line: two decimal numbers separated by a space, \
         e.g. <code>100 200</code>. A <code>{rules}</code> file works too.\n\
         3. Send a <code>{payload}</code> file, or a zip/tar/tar.gz archive containing them.\n\n\
         Each rule swaps the last 4-byte occurrence of its two values. \
         Sessions close after {idle} of inactivity.\n\n\
         /balance shows your remaining credits.",
        rules = escape_html(rule_list_suffix),
        payload = escape_html(payload_suffix),
        idle = format_duration(idle_timeout),
    )
}

pub fn session_started_html() -> String {
    "🛠 Send swap rules (two decimal numbers per line, separated by a space), \
     then send the file to process."
        .to_string()
}

pub fn rules_reply_html(sub: &RuleSubmission) -> String {
    let mut out = String::new();
    for r in &sub.rejected {
        out.push_str(&format!("⚠️ line {}: {}, skipped\n", r.line, r.reason));
    }

    if sub.accepted == 0 {
        out.push_str("❌ No valid swap rules found, please try again.");
        return out;
    }

    out.push_str(&format!(
        "✅ Added {} rule(s), {} in total. Send more or send the file.",
        sub.accepted, sub.total
    ));
    out
}

pub fn transform_caption_html(out: &TransformedArtifact, balance: u64) -> String {
    let mut caption = format!("✅ Done! {} rule(s) applied", out.rules_applied);
    if !out.entries.is_empty() {
        caption.push_str(&format!(" to {} file(s)", out.patched_count()));
    }
    caption.push('.');
    if out.cost > 0 {
        caption.push_str(&format!(
            "\nUsed {} credit(s), {} remaining.",
            out.cost, balance
        ));
    }
    caption
}

pub fn insufficient_credits_html(needed: u64, balance: u64) -> String {
    format!("❌ Not enough credits: need {needed}, you have {balance}.")
}

/// User-facing text for an engine failure. Internal errors are not echoed.
pub fn error_html(e: &Error) -> String {
    match e {
        Error::NoActiveSession => "❌ No active session. Send /swap first.".to_string(),
        Error::EmptyRuleSet => "❌ Send at least one swap rule before the file.".to_string(),
        Error::SizeExceeded { max, .. } => {
            format!("❌ File too large. Maximum size is {}MB.", max / (1024 * 1024))
        }
        other if other.is_user_facing() => format!("❌ {}", escape_html(&other.to_string())),
        _ => "❌ Processing failed, please try again later.".to_string(),
    }
}
