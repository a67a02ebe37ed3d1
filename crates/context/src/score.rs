//! Candidate scoring for the fallback aggregation path.
//!
//! Each candidate gets three independent signals: the board's hybrid search
//! score (plus a bounded curated-note boost), a recency boost for things seen
//! in the current session, and lexical overlap with the query. The final
//! score is the maximum of the three, so one strong signal is never diluted
//! by two weak ones.

/// Largest score contribution a curated-note weight can add.
const NOTE_BOOST_CAP: f32 = 0.3;
/// Recency boost for the most recently seen candidate.
const RECENCY_TOP: f32 = 0.9;
/// How much the recency boost drops per position.
const RECENCY_STEP: f32 = 0.1;
/// Recency boost never decays below this.
const RECENCY_FLOOR: f32 = 0.3;

/// Bounded boost derived from curated-note weight.
pub fn note_boost(note_weight: Option<f32>) -> f32 {
    match note_weight {
        Some(weight) if weight > 0.0 => (weight * 0.1).min(NOTE_BOOST_CAP),
        _ => 0.0,
    }
}

/// Recency boost by position in the session's recent history, newest first.
pub fn recency_boost(position: usize) -> f32 {
    (RECENCY_TOP - RECENCY_STEP * position as f32).max(RECENCY_FLOOR)
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= 3)
        .map(str::to_string)
        .collect()
}

/// Fraction of the query's distinct tokens that appear in `text`.
pub fn lexical_overlap(query: &str, text: &str) -> f32 {
    let mut query_tokens = tokens(query);
    query_tokens.sort();
    query_tokens.dedup();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate = tokens(text);
    let hits = query_tokens
        .iter()
        .filter(|token| candidate.contains(token))
        .count();
    hits as f32 / query_tokens.len() as f32
}

/// Max-fusion of the three signals.
pub fn fuse(semantic: f32, recency: f32, lexical: f32) -> f32 {
    semantic.max(recency).max(lexical)
}
