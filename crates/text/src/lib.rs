//! Text cleanup, payload classification, and idempotency key derivation.
//!
//! Everything in this crate is a pure function: same input, same output,
//! no I/O and no shared state.

pub mod fingerprint;
pub mod normalize;

pub use {
    fingerprint::{content_fingerprint, ensure_idempotency_key},
    normalize::{is_control_payload, normalize, summarize, truncate_chars},
};

/// Opening marker for a context block injected ahead of the model prompt.
pub const CONTEXT_BLOCK_OPEN: &str = "[[board-context]]";
/// Closing marker for an injected context block.
pub const CONTEXT_BLOCK_CLOSE: &str = "[[/board-context]]";
