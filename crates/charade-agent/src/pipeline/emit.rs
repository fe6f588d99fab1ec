//! Post-processing and delivery of generated segments.

use tracing::warn;

use charade_channels::OutboundMessage;
use charade_core::types::{ConversationId, UserId};
use charade_sessions::ConversationSession;

use super::context::BotContext;

/// Strip the persona's own speaker tag from a generated segment.
///
/// Order: a leading `<persona><separator>` prefix wins; otherwise the text
/// after the first separator character is kept; leading punctuation and
/// separator characters are removed from whatever remains.
pub fn clean_segment(segment: &str, persona: &str) -> String {
    let text = segment.trim();

    for sep in ["::", "：", ":"] {
        if let Some(rest) = text.strip_prefix(persona).and_then(|r| r.strip_prefix(sep)) {
            return strip_leading_separators(rest).to_string();
        }
    }

    if let Some(idx) = text.find(['：', ':']) {
        let sep_len = text[idx..].chars().next().map(char::len_utf8).unwrap_or(1);
        return strip_leading_separators(&text[idx + sep_len..]).to_string();
    }

    strip_leading_separators(text).to_string()
}

fn strip_leading_separators(text: &str) -> &str {
    text.trim_start_matches(|c: char| {
        matches!(c, ':' | '：' | ',' | '，' | '。' | '、' | ' ' | '　')
    })
}

/// Details of the turn that triggered the in-flight completion.
#[derive(Debug, Clone)]
pub(crate) struct Trigger {
    pub author: UserId,
    pub addressed_to_self: bool,
}

/// Clean one segment, record it as the persona's turn, and deliver it.
///
/// When the triggering turn addressed the persona and its author is no
/// longer the conversation's most recent speaker, the delivery carries an
/// explicit mention of that author.
pub(crate) async fn emit_segment<C: BotContext>(
    ctx: &C,
    session: &ConversationSession,
    conversation: &ConversationId,
    segment: &str,
    trigger: &Trigger,
) {
    let persona = ctx.runtime().prompt().persona_name();
    let cleaned = clean_segment(segment, persona);
    if cleaned.is_empty() {
        return;
    }

    session.append_turn(persona, &cleaned);

    let mention_user_id = (trigger.addressed_to_self
        && session.last_author().as_ref() != Some(&trigger.author))
    .then(|| trigger.author.clone());

    let msg = OutboundMessage {
        conversation_id: conversation.clone(),
        text: cleaned,
        mention_user_id,
    };
    if let Err(e) = ctx.port().send(&msg).await {
        warn!(conversation = %conversation, error = %e, "delivery failed");
    }
}
