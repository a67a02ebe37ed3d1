//! Context retrieval: assembles a bounded, ranked summary of prior board
//! state for injection ahead of a new agent turn.
//!
//! Prefers the board's pre-aggregated `/context` block; falls back to manual
//! aggregation (topics, session history, hybrid search) within the remaining
//! time budget. Read-only; never interferes with delivery.

pub mod engine;
pub mod render;
pub mod score;

pub use engine::{BoardReader, ContextEngine, ContextOptions, ContextRequest};
