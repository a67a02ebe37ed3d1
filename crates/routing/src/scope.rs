//! The BoardScope cache: short-lived routing state per session.
//!
//! Scopes are keyed twice — by session alias and by owning agent id — and
//! expire a fixed interval after their last refresh. An expired scope is
//! treated exactly like a missing one; it is never partially trusted.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use pinboard_common::now_ms;

use crate::key::{SessionRef, parse_session_key};

/// Whether a scope points at a whole topic or a task within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Topic,
    Task,
}

/// Where a conversation's output belongs, with a freshness window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardScope {
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub kind: ScopeKind,
    pub origin_session_key: String,
    pub inherited: bool,
    pub updated_at_ms: u64,
}

/// The resolver's answer for one event. Derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingResult {
    pub topic_id: Option<String>,
    pub task_id: Option<String>,
    pub scope: Option<BoardScope>,
}

/// Every identifier under which a session may be known. Lookup priority is
/// the field order: explicit session key, host-context session key,
/// event-metadata session key, conversation id.
#[derive(Debug, Clone, Default)]
pub struct SessionAliases {
    pub session_key: String,
    pub context_session_key: Option<String>,
    pub meta_session_key: Option<String>,
    pub conversation_id: Option<String>,
    /// The agent this session belongs to, from host metadata.
    pub agent_id: Option<String>,
}

impl SessionAliases {
    pub fn for_key(session_key: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            ..Default::default()
        }
    }

    /// Aliases in lookup priority order, deduplicated, empties dropped.
    fn ordered(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::with_capacity(4);
        for alias in [
            Some(self.session_key.as_str()),
            self.context_session_key.as_deref(),
            self.meta_session_key.as_deref(),
            self.conversation_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !alias.is_empty() && !out.contains(&alias) {
                out.push(alias);
            }
        }
        out
    }
}

struct CacheInner {
    by_session: HashMap<String, BoardScope>,
    by_agent: HashMap<String, BoardScope>,
}

/// In-memory scope cache with TTL. Safe for concurrent use from real OS
/// threads; all access goes through one mutex.
pub struct ScopeCache {
    ttl_ms: u64,
    auto_topic: bool,
    inner: Mutex<CacheInner>,
}

impl ScopeCache {
    pub fn new(ttl_ms: u64, auto_topic: bool) -> Self {
        Self {
            ttl_ms,
            auto_topic,
            inner: Mutex::new(CacheInner {
                by_session: HashMap::new(),
                by_agent: HashMap::new(),
            }),
        }
    }

    /// Resolve the destination for an event arriving now.
    pub fn resolve(&self, aliases: &SessionAliases) -> RoutingResult {
        self.resolve_at(aliases, now_ms())
    }

    /// Resolve at an explicit timestamp. The state machine:
    /// 1. a key that directly encodes a destination produces a fresh scope
    ///    and refreshes it under every alias and the owning agent;
    /// 2. a sub-agent key with no direct destination inherits the most
    ///    recent non-expired scope from its aliases or owner;
    /// 3. otherwise the session is unscoped (optionally with an auto topic).
    pub fn resolve_at(&self, aliases: &SessionAliases, now: u64) -> RoutingResult {
        match parse_session_key(&aliases.session_key) {
            SessionRef::Topic { topic_id } => {
                let scope = BoardScope {
                    topic_id,
                    task_id: None,
                    kind: ScopeKind::Topic,
                    origin_session_key: aliases.session_key.clone(),
                    inherited: false,
                    updated_at_ms: now,
                };
                self.store(aliases, scope.clone());
                RoutingResult {
                    topic_id: Some(scope.topic_id.clone()),
                    task_id: None,
                    scope: Some(scope),
                }
            },
            SessionRef::Task { topic_id, task_id } => {
                let scope = BoardScope {
                    topic_id,
                    task_id: Some(task_id),
                    kind: ScopeKind::Task,
                    origin_session_key: aliases.session_key.clone(),
                    inherited: false,
                    updated_at_ms: now,
                };
                self.store(aliases, scope.clone());
                RoutingResult {
                    topic_id: Some(scope.topic_id.clone()),
                    task_id: scope.task_id.clone(),
                    scope: Some(scope),
                }
            },
            SessionRef::Subagent { owner, .. } => match self.inherit(aliases, &owner, now) {
                Some(scope) => RoutingResult {
                    topic_id: Some(scope.topic_id.clone()),
                    task_id: scope.task_id.clone(),
                    scope: Some(scope),
                },
                None => self.fallback(aliases),
            },
            SessionRef::Plain => self.fallback(aliases),
        }
    }

    /// Write a scope under every alias and, when known, the owning agent id.
    fn store(&self, aliases: &SessionAliases, scope: BoardScope) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for alias in aliases.ordered() {
            inner.by_session.insert(alias.to_string(), scope.clone());
        }
        if let Some(agent_id) = aliases.agent_id.as_deref()
            && !agent_id.is_empty()
        {
            inner.by_agent.insert(agent_id.to_string(), scope.clone());
        }
    }

    /// Find the freshest non-expired scope for any alias or the owner, copy
    /// it with `inherited = true`, and refresh its TTL under this session.
    fn inherit(&self, aliases: &SessionAliases, owner: &str, now: u64) -> Option<BoardScope> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut found: Option<BoardScope> = None;
        for alias in aliases.ordered() {
            match inner.by_session.get(alias).cloned() {
                Some(scope) if !self.expired(&scope, now) => {
                    found = Some(scope);
                    break;
                },
                Some(_) => {
                    inner.by_session.remove(alias);
                },
                None => {},
            }
        }
        if found.is_none() {
            match inner.by_agent.get(owner).cloned() {
                Some(scope) if !self.expired(&scope, now) => found = Some(scope),
                Some(_) => {
                    inner.by_agent.remove(owner);
                },
                None => {},
            }
        }

        let source = found?;
        let scope = BoardScope {
            inherited: true,
            updated_at_ms: now,
            ..source
        };
        debug!(
            session_key = %aliases.session_key,
            topic_id = %scope.topic_id,
            "sub-agent session inherited scope"
        );
        inner
            .by_session
            .insert(aliases.session_key.clone(), scope.clone());
        Some(scope)
    }

    fn fallback(&self, aliases: &SessionAliases) -> RoutingResult {
        if self.auto_topic && !aliases.session_key.is_empty() {
            let digest = pinboard_text::content_fingerprint(&aliases.session_key);
            return RoutingResult {
                topic_id: Some(format!("session-{}", &digest[..8])),
                task_id: None,
                scope: None,
            };
        }
        RoutingResult::default()
    }

    fn expired(&self, scope: &BoardScope, now: u64) -> bool {
        now.saturating_sub(scope.updated_at_ms) > self.ttl_ms
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const TTL_MS: u64 = 15 * 60 * 1000;

    fn cache() -> ScopeCache {
        ScopeCache::new(TTL_MS, false)
    }

    #[test]
    fn direct_topic_routes_immediately() {
        let cache = cache();
        let result = cache.resolve_at(&SessionAliases::for_key("board:topic:abc123"), 1000);
        assert_eq!(result.topic_id.as_deref(), Some("abc123"));
        assert_eq!(result.task_id, None);
        let scope = result.scope.unwrap();
        assert!(!scope.inherited);
        assert_eq!(scope.kind, ScopeKind::Topic);
    }

    #[test]
    fn direct_task_routes_topic_and_task() {
        let cache = cache();
        let result = cache.resolve_at(&SessionAliases::for_key("board:task:abc123:42"), 1000);
        assert_eq!(result.topic_id.as_deref(), Some("abc123"));
        assert_eq!(result.task_id.as_deref(), Some("42"));
        assert_eq!(result.scope.unwrap().kind, ScopeKind::Task);
    }

    #[test]
    fn subagent_without_prior_scope_is_unscoped() {
        let cache = cache();
        let result = cache.resolve_at(&SessionAliases::for_key("agent:main:subagent:xyz"), 1000);
        assert_eq!(result.topic_id, None);
        assert_eq!(result.task_id, None);
        assert!(result.scope.is_none());
    }

    #[test]
    fn subagent_inherits_owner_scope() {
        let cache = cache();

        // A prior event on a task session owned by agent "main".
        let owner_aliases = SessionAliases {
            session_key: "board:task:abc123:42".into(),
            agent_id: Some("main".into()),
            ..Default::default()
        };
        cache.resolve_at(&owner_aliases, 1000);

        // The sub-agent session now inherits topic and task.
        let result = cache.resolve_at(&SessionAliases::for_key("agent:main:subagent:xyz"), 2000);
        assert_eq!(result.topic_id.as_deref(), Some("abc123"));
        assert_eq!(result.task_id.as_deref(), Some("42"));
        let scope = result.scope.unwrap();
        assert!(scope.inherited);
        assert_eq!(scope.origin_session_key, "board:task:abc123:42");
    }

    #[test]
    fn alias_priority_order_first_match_wins() {
        let cache = cache();
        cache.resolve_at(
            &SessionAliases {
                session_key: "board:topic:from-conv".into(),
                conversation_id: Some("conv-1".into()),
                ..Default::default()
            },
            1000,
        );
        cache.resolve_at(
            &SessionAliases {
                session_key: "board:topic:from-ctx".into(),
                context_session_key: Some("ctx-1".into()),
                ..Default::default()
            },
            1000,
        );

        // Context session key outranks conversation id.
        let result = cache.resolve_at(
            &SessionAliases {
                session_key: "agent:main:subagent:xyz".into(),
                context_session_key: Some("ctx-1".into()),
                conversation_id: Some("conv-1".into()),
                ..Default::default()
            },
            2000,
        );
        assert_eq!(result.topic_id.as_deref(), Some("from-ctx"));
    }

    #[test]
    fn scope_expires_after_ttl() {
        let cache = cache();
        let owner_aliases = SessionAliases {
            session_key: "board:topic:abc123".into(),
            agent_id: Some("main".into()),
            ..Default::default()
        };
        let t0 = 1_000_000;
        cache.resolve_at(&owner_aliases, t0);

        let sub = SessionAliases::for_key("agent:main:subagent:xyz");

        // Fresh at +14 minutes.
        let fresh = cache.resolve_at(&sub, t0 + 14 * 60 * 1000);
        assert_eq!(fresh.topic_id.as_deref(), Some("abc123"));

        // Re-seed, then check absence strictly past the TTL.
        cache.resolve_at(&owner_aliases, t0);
        let stale = cache.resolve_at(&SessionAliases::for_key("agent:main:subagent:other"), t0 + 16 * 60 * 1000);
        assert_eq!(stale.topic_id, None);
        assert!(stale.scope.is_none());
    }

    #[test]
    fn inheritance_refreshes_ttl() {
        let cache = cache();
        let owner_aliases = SessionAliases {
            session_key: "board:topic:abc123".into(),
            agent_id: Some("main".into()),
            ..Default::default()
        };
        let t0 = 0;
        cache.resolve_at(&owner_aliases, t0);

        // Inherit at +10 min; the copy's clock restarts.
        let sub = SessionAliases::for_key("agent:main:subagent:xyz");
        cache.resolve_at(&sub, t0 + 10 * 60 * 1000);

        // At +20 min the owner scope is stale but the inherited copy is not.
        let result = cache.resolve_at(&sub, t0 + 20 * 60 * 1000);
        assert_eq!(result.topic_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn auto_topic_fallback_when_enabled() {
        let cache = ScopeCache::new(TTL_MS, true);
        let result = cache.resolve_at(&SessionAliases::for_key("tg:12345"), 1000);
        let topic = result.topic_id.unwrap();
        assert!(topic.starts_with("session-"));
        assert_eq!(result.task_id, None);

        // Deterministic per session key.
        let again = cache.resolve_at(&SessionAliases::for_key("tg:12345"), 2000);
        assert_eq!(again.topic_id.unwrap(), topic);
    }

    #[test]
    fn plain_session_without_auto_topic_is_unassigned() {
        let cache = cache();
        let result = cache.resolve_at(&SessionAliases::for_key("tg:12345"), 1000);
        assert_eq!(result, RoutingResult::default());
    }
}
