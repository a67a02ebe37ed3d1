//! Session-to-scope resolution.
//!
//! Maps an opaque session key to a board destination (topic/task), including
//! inheritance for nested sub-agent sessions and a short-lived scope cache.

pub mod key;
pub mod scope;

pub use {
    key::{SessionRef, parse_session_key, speaker_labels},
    scope::{BoardScope, RoutingResult, ScopeCache, ScopeKind, SessionAliases},
};
