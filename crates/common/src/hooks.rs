//! Host lifecycle hook types and the dispatch table.
//!
//! The host runtime fires one callback per lifecycle event; handlers are
//! registered once at startup and dispatched through this table. A failing
//! handler is logged and skipped — it must never break the host's turn.

use std::{collections::HashMap, fmt, sync::Arc};

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{debug, info, warn},
};

// ── HookEvent ───────────────────────────────────────────────────────────────

/// Lifecycle events delivered by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    MessageReceived,
    MessageSending,
    BeforeToolCall,
    AfterToolCall,
    AgentRunEnd,
    BeforeAgentStart,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookEvent {
    /// All variants, for iteration.
    pub const ALL: &'static [HookEvent] = &[
        Self::MessageReceived,
        Self::MessageSending,
        Self::BeforeToolCall,
        Self::AfterToolCall,
        Self::AgentRunEnd,
        Self::BeforeAgentStart,
    ];
}

// ── HookContext / HookPayload ───────────────────────────────────────────────

/// Identifiers the host attaches to every lifecycle callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookContext {
    pub agent_id: String,
    pub session_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Typed payload carried with each hook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum HookPayload {
    MessageReceived {
        ctx: HookContext,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    MessageSending {
        ctx: HookContext,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    BeforeToolCall {
        ctx: HookContext,
        tool_name: String,
        arguments: Value,
    },
    AfterToolCall {
        ctx: HookContext,
        tool_name: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    AgentRunEnd {
        ctx: HookContext,
        text: String,
        iterations: usize,
        tool_calls: usize,
    },
    BeforeAgentStart {
        ctx: HookContext,
        prompt: String,
    },
}

impl HookPayload {
    /// Returns the [`HookEvent`] variant that matches this payload.
    pub fn event(&self) -> HookEvent {
        match self {
            Self::MessageReceived { .. } => HookEvent::MessageReceived,
            Self::MessageSending { .. } => HookEvent::MessageSending,
            Self::BeforeToolCall { .. } => HookEvent::BeforeToolCall,
            Self::AfterToolCall { .. } => HookEvent::AfterToolCall,
            Self::AgentRunEnd { .. } => HookEvent::AgentRunEnd,
            Self::BeforeAgentStart { .. } => HookEvent::BeforeAgentStart,
        }
    }

    /// The host context attached to this payload.
    pub fn ctx(&self) -> &HookContext {
        match self {
            Self::MessageReceived { ctx, .. }
            | Self::MessageSending { ctx, .. }
            | Self::BeforeToolCall { ctx, .. }
            | Self::AfterToolCall { ctx, .. }
            | Self::AgentRunEnd { ctx, .. }
            | Self::BeforeAgentStart { ctx, .. } => ctx,
        }
    }
}

// ── HookAction ──────────────────────────────────────────────────────────────

/// The outcome a hook handler returns.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum HookAction {
    /// Nothing to add; let the event proceed.
    #[default]
    Continue,
    /// Text the host should insert ahead of the model prompt.
    /// Only meaningful for [`HookEvent::BeforeAgentStart`].
    PrependContext(String),
}

// ── HookHandler trait ───────────────────────────────────────────────────────

/// Trait implemented by hook handlers.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// A human-readable name for this handler.
    fn name(&self) -> &str;

    /// Which events this handler subscribes to.
    fn events(&self) -> &[HookEvent];

    /// Priority for ordering. Higher values run first. Default is 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle the event. Must return promptly; long-running work belongs on
    /// detached background tasks.
    async fn handle(&self, event: HookEvent, payload: &HookPayload) -> anyhow::Result<HookAction>;
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Manages registered hook handlers and dispatches events to them.
pub struct HookRegistry {
    handlers: HashMap<HookEvent, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for all events it subscribes to.
    /// Handlers are sorted by priority (descending) within each event.
    pub fn register(&mut self, handler: Arc<dyn HookHandler>) {
        for &event in handler.events() {
            let handlers = self.handlers.entry(event).or_default();
            handlers.push(Arc::clone(&handler));
            handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        }
        info!(handler = handler.name(), "hook handler registered");
    }

    /// Returns true if any handlers are registered for the given event.
    pub fn has_handlers(&self, event: HookEvent) -> bool {
        self.handlers.get(&event).is_some_and(|v| !v.is_empty())
    }

    /// List all registered handler names (deduplicated).
    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .values()
            .flatten()
            .map(|h| h.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Dispatch an event to all registered handlers in priority order.
    ///
    /// Handler errors are logged and skipped. Prepend texts from multiple
    /// handlers are joined with a blank line, highest priority first.
    pub async fn dispatch(&self, payload: &HookPayload) -> HookAction {
        let event = payload.event();
        let handlers = match self.handlers.get(&event) {
            Some(h) if !h.is_empty() => h,
            _ => return HookAction::Continue,
        };

        debug!(event = %event, count = handlers.len(), "dispatching hook event");

        let mut prepends: Vec<String> = Vec::new();
        for handler in handlers {
            match handler.handle(event, payload).await {
                Ok(HookAction::Continue) => {},
                Ok(HookAction::PrependContext(text)) => {
                    if !text.is_empty() {
                        prepends.push(text);
                    }
                },
                Err(e) => {
                    warn!(handler = handler.name(), event = %event, error = %e, "hook handler failed");
                },
            }
        }

        if prepends.is_empty() {
            HookAction::Continue
        } else {
            HookAction::PrependContext(prepends.join("\n\n"))
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
