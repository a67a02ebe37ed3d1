//! Stable dedup keys for outbound events.
//!
//! Key derivation prefers the host's upstream message id when present; the
//! content-fingerprint fallback tolerates minor re-serialization differences
//! but keeps materially different messages distinct. When ambiguous the
//! scheme under-deduplicates: a duplicate board entry beats a silently
//! dropped message.

use sha2::{Digest, Sha256};

use pinboard_common::event::BoardEvent;

/// Characters of hex digest kept for a content fingerprint.
const FINGERPRINT_LEN: usize = 16;
/// Characters of hex digest kept for an idempotency key.
const KEY_LEN: usize = 32;
/// Content prefix hashed into a fingerprint.
const FINGERPRINT_CONTENT_CHARS: usize = 256;

fn hex_digest(parts: &[&str], len: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())[..len].to_string()
}

/// A short stable digest of message content. Whitespace runs and case are
/// normalized away and only a bounded prefix is hashed, so re-wrapped or
/// re-serialized copies of the same message collapse.
pub fn content_fingerprint(text: &str) -> String {
    let collapsed: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(FINGERPRINT_CONTENT_CHARS)
        .collect();
    hex_digest(&[&collapsed], FINGERPRINT_LEN)
}

/// Derive the idempotency key for an event.
///
/// Priority: an already-stamped key is reused verbatim; with an upstream
/// message id the key is deterministic across process restarts; otherwise
/// the key hashes the event's routing identity plus a content fingerprint
/// and creation time.
pub fn ensure_idempotency_key(event: &BoardEvent) -> String {
    if let Some(key) = &event.idempotency_key {
        return key.clone();
    }

    let channel = event.source.channel_id.as_deref().unwrap_or("");
    let scope = event.source.session_key.as_str();
    let kind = event.kind.as_str();

    if let Some(message_id) = event.source.message_id.as_deref() {
        return hex_digest(
            &["msg", channel, scope, message_id, &event.speaker_id, kind],
            KEY_LEN,
        );
    }

    let created_at = event.created_at_ms.to_string();
    let topic = event.destination_topic_id.as_deref().unwrap_or("");
    let task = event.destination_task_id.as_deref().unwrap_or("");
    hex_digest(
        &[
            "fp",
            scope,
            channel,
            &event.speaker_id,
            kind,
            topic,
            task,
            &content_fingerprint(&event.content),
            &created_at,
        ],
        KEY_LEN,
    )
}
