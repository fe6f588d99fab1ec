//! The full turn pipeline, one cooperative task per inbound message:
//! gate → address → history → safety → compose → stream → emit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use charade_channels::InboundMessage;
use charade_sessions::estimate_tokens;

use crate::segment::SegmentAssembler;
use crate::stream::StreamEvent;

use super::address::{self, AddressingKind};
use super::context::BotContext;
use super::emit::{emit_segment, Trigger};
use super::gate::{self, Admission};

/// Inline image elements are never processed.
const IMAGE_MARKER: &str = "<image";

/// Boxed indirection for the deferred-retry recursion.
///
/// Routing the recursive call through a helper whose return type is an
/// explicitly `Send` boxed future breaks the cyclic `Send` auto-trait
/// inference that a directly self-recursive `async fn` would otherwise hit
/// when spawned onto the runtime.
fn handle_message_boxed<C: BotContext + 'static>(
    ctx: Arc<C>,
    inbound: InboundMessage,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(handle_message(ctx, inbound))
}

/// Process one inbound message end to end.
///
/// Never returns an error: every failure mode (transport, safety, identity)
/// resolves to "no reply", logged at an appropriate level.
pub async fn handle_message<C: BotContext + 'static>(ctx: Arc<C>, inbound: InboundMessage) {
    let text = inbound.text.trim().to_string();
    if text.is_empty() {
        return;
    }
    if text.contains(IMAGE_MARKER) {
        debug!(conversation = %inbound.conversation_id, "ignoring image message");
        return;
    }

    let config = ctx.config();
    let session = ctx.sessions().get_or_create(&inbound.conversation_id);
    let kind = address::classify(&text, &config.persona.self_id);
    let addressed_to_self = kind == AddressingKind::ToSelf;

    let decision = session.with_throttle(|throttle| {
        gate::admit(throttle, &config.throttle, addressed_to_self, Instant::now())
    });

    match decision {
        Admission::Drop => {
            debug!(conversation = %inbound.conversation_id, "message dropped by gate");
            return;
        }
        Admission::Defer(delay) => {
            debug!(
                conversation = %inbound.conversation_id,
                user = %inbound.author_id,
                delay_ms = delay.as_millis() as u64,
                "deferring addressed message"
            );
            let retry_ctx = Arc::clone(&ctx);
            let retry_msg = inbound.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                handle_message_boxed(retry_ctx, retry_msg).await;
            });
            session.schedule_retry(&inbound.author_id, handle);
            return;
        }
        Admission::Process => {
            // The admitted run supersedes any pending retry for this user.
            session.clear_retry(&inbound.author_id);
        }
    }

    let resolved = address::resolve(
        &text,
        &config.persona.self_id,
        &config.persona.name,
        ctx.identities(),
    )
    .await;

    session.append_turn(&inbound.author_name, &resolved.text);
    session.set_last_author(inbound.author_id.clone());

    if !resolved.completes {
        debug!(conversation = %inbound.conversation_id, "turn addressed to another member; recorded only");
        return;
    }

    // One streaming call per conversation; a concurrent admitted turn is
    // dropped (its text is already in history).
    let Some(_guard) = session.try_begin_completion() else {
        debug!(conversation = %inbound.conversation_id, "completion already in flight; not replying");
        return;
    };

    if config.safety.enabled && estimate_tokens(&resolved.text) > config.safety.token_threshold {
        if crate::safety::screen_input(ctx.runtime(), &resolved.text).await {
            info!(conversation = %inbound.conversation_id, "turn rejected by safety gate");
            return;
        }
    }

    let prompt = ctx.runtime().prompt();
    let lines: Vec<String> = session
        .slice_within_budget(config.history.token_budget, estimate_tokens)
        .iter()
        .map(|turn| prompt.render_line(&turn.speaker, &turn.text))
        .collect();
    let prompt_ctx = prompt.compose(&lines, Local::now());
    let request = ctx.runtime().completion_request(prompt_ctx);

    // Hard ceiling on call rate: stamp the window before the call starts.
    session.with_throttle(|throttle| throttle.mark_admitted(Instant::now()));

    let trigger = Trigger {
        author: inbound.author_id.clone(),
        addressed_to_self,
    };
    let mut assembler = SegmentAssembler::new(&config.persona.name);

    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamEvent>(64);
    let send_fut = ctx.runtime().provider().send_stream(&request, stream_tx);
    tokio::pin!(send_fut);

    loop {
        tokio::select! {
            event = stream_rx.recv() => {
                match event {
                    Some(StreamEvent::TextDelta { text }) => {
                        if let Some(segment) = assembler.push(&text) {
                            emit_segment(
                                ctx.as_ref(),
                                &session,
                                &inbound.conversation_id,
                                &segment,
                                &trigger,
                            )
                            .await;
                        }
                    }
                    Some(StreamEvent::Done { .. }) => {}
                    Some(StreamEvent::Error { message }) => {
                        warn!(conversation = %inbound.conversation_id, error = %message, "stream error; abandoning turn");
                        return;
                    }
                    None => break,
                }
            }
            result = &mut send_fut => {
                if let Err(e) = result {
                    warn!(conversation = %inbound.conversation_id, error = %e, "completion call failed; abandoning turn");
                    return;
                }
                // Drain events that were in flight when the call returned.
                while let Ok(event) = stream_rx.try_recv() {
                    if let StreamEvent::TextDelta { text } = event {
                        if let Some(segment) = assembler.push(&text) {
                            emit_segment(
                                ctx.as_ref(),
                                &session,
                                &inbound.conversation_id,
                                &segment,
                                &trigger,
                            )
                            .await;
                        }
                    }
                }
                break;
            }
        }
    }

    if assembler.skipped() {
        info!(conversation = %inbound.conversation_id, "persona declined to respond");
        return;
    }
    if let Some(rest) = assembler.finish() {
        emit_segment(
            ctx.as_ref(),
            &session,
            &inbound.conversation_id,
            &rest,
            &trigger,
        )
        .await;
    }
}
