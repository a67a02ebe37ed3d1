//! The board logger hook: turns host lifecycle callbacks into board events
//! and injects retrieved context ahead of new agent turns.

use std::sync::Arc;

use {async_trait::async_trait, tracing::debug};

use {
    pinboard_common::{
        event::{BoardEvent, EventKind, SourceMeta},
        hooks::{HookAction, HookContext, HookEvent, HookHandler, HookPayload},
        now_ms,
    },
    pinboard_context::ContextRequest,
    pinboard_routing::{SessionAliases, parse_session_key, speaker_labels},
    pinboard_text::{
        CONTEXT_BLOCK_CLOSE, CONTEXT_BLOCK_OPEN, ensure_idempotency_key, is_control_payload,
        normalize, summarize,
    },
};

use crate::session::LoggerSession;

/// One-line summary width on board entries.
const SUMMARY_WIDTH: usize = 160;

/// Logs conversation turns, tool activity, and run outcomes to the board,
/// and prepends retrieved context before each agent turn.
pub struct BoardLoggerHook {
    session: Arc<LoggerSession>,
}

/// Raw material for one board event, before routing and normalization.
struct Draft<'a> {
    ctx: &'a HookContext,
    kind: EventKind,
    content: &'a str,
    outbound: bool,
    message_id: Option<&'a str>,
    raw_payload: Option<serde_json::Value>,
}

impl BoardLoggerHook {
    pub fn new(session: Arc<LoggerSession>) -> Self {
        Self { session }
    }

    /// Normalize, route, label, stamp, and enqueue. Drops empty and control
    /// payloads at `debug`.
    async fn record(&self, draft: Draft<'_>) {
        let normalized = normalize(draft.content);
        if normalized.is_empty() {
            debug!(session_key = draft.ctx.session_key, "empty after normalization, dropped");
            return;
        }
        if is_control_payload(&normalized) {
            debug!(session_key = draft.ctx.session_key, "control payload, dropped");
            return;
        }

        let aliases = SessionAliases {
            session_key: draft.ctx.session_key.clone(),
            context_session_key: None,
            meta_session_key: None,
            conversation_id: draft.ctx.conversation_id.clone(),
            agent_id: Some(draft.ctx.agent_id.clone()),
        };
        let routing = self.session.scope_cache.resolve(&aliases);

        let session_ref = parse_session_key(&draft.ctx.session_key);
        let (speaker_label, _audience) = speaker_labels(&session_ref, draft.outbound);
        let speaker_id = if draft.outbound {
            draft.ctx.agent_id.clone()
        } else {
            "user".to_string()
        };

        let mut event = BoardEvent {
            destination_topic_id: routing.topic_id,
            destination_task_id: routing.task_id,
            kind: draft.kind,
            summary: summarize(&normalized, SUMMARY_WIDTH),
            content: normalized,
            raw_payload: draft.raw_payload,
            created_at_ms: now_ms(),
            speaker_id,
            speaker_label,
            source: SourceMeta {
                session_key: draft.ctx.session_key.clone(),
                agent_id: Some(draft.ctx.agent_id.clone()),
                channel_id: draft.ctx.channel_id.clone(),
                conversation_id: draft.ctx.conversation_id.clone(),
                message_id: draft.message_id.map(str::to_string),
            },
            idempotency_key: None,
        };
        event.idempotency_key = Some(ensure_idempotency_key(&event));

        self.session.queue.send(event).await;
    }

    /// Build the context block for a new agent turn, wrapped in markers the
    /// normalizer strips back out of logged turns.
    async fn prepend_context(&self, ctx: &HookContext, prompt: &str) -> HookAction {
        let Some(engine) = &self.session.context else {
            return HookAction::Continue;
        };
        let request = ContextRequest {
            query: prompt,
            session_key: &ctx.session_key,
            signals: &[],
        };
        match engine.build_context(request).await {
            Some(block) => HookAction::PrependContext(format!(
                "{CONTEXT_BLOCK_OPEN}\n{block}\n{CONTEXT_BLOCK_CLOSE}"
            )),
            None => HookAction::Continue,
        }
    }
}

#[async_trait]
impl HookHandler for BoardLoggerHook {
    fn name(&self) -> &str {
        "board-logger"
    }

    fn events(&self) -> &[HookEvent] {
        HookEvent::ALL
    }

    async fn handle(&self, _event: HookEvent, payload: &HookPayload) -> anyhow::Result<HookAction> {
        match payload {
            HookPayload::MessageReceived {
                ctx,
                content,
                message_id,
            } => {
                self.record(Draft {
                    ctx,
                    kind: EventKind::Conversation,
                    content,
                    outbound: false,
                    message_id: message_id.as_deref(),
                    raw_payload: None,
                })
                .await;
            },
            HookPayload::MessageSending {
                ctx,
                content,
                message_id,
            } => {
                self.record(Draft {
                    ctx,
                    kind: EventKind::Conversation,
                    content,
                    outbound: true,
                    message_id: message_id.as_deref(),
                    raw_payload: None,
                })
                .await;
            },
            HookPayload::BeforeToolCall {
                ctx,
                tool_name,
                arguments,
            } => {
                let content = format!("tool call: {tool_name}");
                self.record(Draft {
                    ctx,
                    kind: EventKind::Action,
                    content: &content,
                    outbound: true,
                    message_id: None,
                    raw_payload: Some(arguments.clone()),
                })
                .await;
            },
            HookPayload::AfterToolCall {
                ctx,
                tool_name,
                success,
                result,
            } => {
                let outcome = if *success { "succeeded" } else { "failed" };
                let content = format!("tool result: {tool_name} {outcome}");
                self.record(Draft {
                    ctx,
                    kind: EventKind::Action,
                    content: &content,
                    outbound: true,
                    message_id: None,
                    raw_payload: result.clone(),
                })
                .await;
            },
            HookPayload::AgentRunEnd {
                ctx,
                text,
                iterations,
                tool_calls,
            } => {
                let content = format!(
                    "run finished after {iterations} iterations and {tool_calls} tool calls: {text}"
                );
                self.record(Draft {
                    ctx,
                    kind: EventKind::Action,
                    content: &content,
                    outbound: true,
                    message_id: None,
                    raw_payload: None,
                })
                .await;
            },
            HookPayload::BeforeAgentStart { ctx, prompt } => {
                return Ok(self.prepend_context(ctx, prompt).await);
            },
        }
        Ok(HookAction::Continue)
    }
}
