//! Strips transport artifacts from message text and classifies payloads.

use crate::{CONTEXT_BLOCK_CLOSE, CONTEXT_BLOCK_OPEN};

/// Keys the board's internal classifier emits. Text that is JSON-shaped and
/// contains at least two of these is machine-to-machine traffic, never a
/// human conversation turn.
const CONTROL_MARKERS: &[&str] = &[
    "\"route\"",
    "\"confidence\"",
    "\"classification\"",
    "\"topic_id\"",
    "\"task_id\"",
    "\"intent\"",
    "\"scores\"",
];

/// Strip known transport noise from message text.
///
/// Removes injected context blocks (marker line through terminator),
/// `[HH:MM:SS]`-style channel timestamp prefixes, message-id tags, and
/// collapses runs of blank lines. Idempotent: applying it twice yields the
/// same output as applying it once.
pub fn normalize(text: &str) -> String {
    let without_blocks = strip_context_blocks(text);

    let mut out: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    for line in without_blocks.lines() {
        let line = strip_timestamp_prefix(line);
        let line = strip_message_id_tags(line);
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push(String::new());
        } else {
            blank_run = 0;
            out.push(line.trim_end().to_string());
        }
    }

    out.join("\n").trim().to_string()
}

/// Remove every injected context block, including the markers themselves.
/// An unterminated open marker drops the rest of the text (the whole tail is
/// injected payload).
fn strip_context_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(CONTEXT_BLOCK_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + CONTEXT_BLOCK_OPEN.len()..];
        match after_open.find(CONTEXT_BLOCK_CLOSE) {
            Some(close) => {
                rest = &after_open[close + CONTEXT_BLOCK_CLOSE.len()..];
            },
            None => {
                rest = "";
            },
        }
    }
    out.push_str(rest);
    out
}

/// Strip leading `[HH:MM:SS]` or `[YYYY-MM-DD HH:MM:SS]` channel timestamps.
/// Relays can stack several; all of them go, so a second pass is a no-op.
fn strip_timestamp_prefix(line: &str) -> &str {
    let mut out = line;
    while let Some(stripped) = strip_one_timestamp(out) {
        out = stripped;
    }
    out
}

fn strip_one_timestamp(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find(']')?;
    let inner = &rest[..end];
    let is_timestamp = !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ':' | '-' | ' ' | '.'))
        && inner.contains(':');
    is_timestamp.then(|| rest[end + 1..].trim_start())
}

/// Remove inline `[msg_id: …]` / `[message_id: …]` tags.
fn strip_message_id_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    loop {
        let tag_start = rest
            .find("[msg_id:")
            .into_iter()
            .chain(rest.find("[message_id:"))
            .min();
        match tag_start {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find(']') {
                    Some(end) => rest = &rest[start + end + 1..],
                    None => {
                        rest = "";
                    },
                }
            },
            None => {
                out.push_str(rest);
                return out.trim_end().to_string();
            },
        }
    }
}

/// Returns true for JSON-shaped text carrying the board classifier's schema
/// keys. Such payloads must never be logged or used for retrieval.
pub fn is_control_payload(text: &str) -> bool {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return false;
    }
    let markers = CONTROL_MARKERS
        .iter()
        .filter(|m| trimmed.contains(**m))
        .count();
    markers >= 2
}

/// Collapse whitespace and bound the result for display as a one-line summary.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// Truncate to at most `max_chars` characters, never splitting a multi-byte
/// boundary. Truncated output ends with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_context_block_with_payload() {
        let text = format!(
            "hello\n{CONTEXT_BLOCK_OPEN}\nLikely topics:\n- infra\n{CONTEXT_BLOCK_CLOSE}\nworld"
        );
        assert_eq!(normalize(&text), "hello\n\nworld");
    }

    #[test]
    fn strips_unterminated_context_block() {
        let text = format!("before\n{CONTEXT_BLOCK_OPEN}\nleaked tail");
        assert_eq!(normalize(&text), "before");
    }

    #[test]
    fn strips_timestamp_prefixes() {
        assert_eq!(normalize("[12:34:56] hello"), "hello");
        assert_eq!(normalize("[2024-03-01 12:34:56] hello"), "hello");
        // Not a timestamp: keep it.
        assert_eq!(normalize("[note] hello"), "[note] hello");
    }

    #[test]
    fn strips_stacked_timestamp_prefixes_in_one_pass() {
        // A relayed message can carry the relay's timestamp in front of the
        // original's; both must go on the first pass.
        assert_eq!(normalize("[12:34:56] [12:00:00] hi"), "hi");
        assert_eq!(normalize("[2024-03-01 08:00:00] [08:01:02] [08:01:03] hi"), "hi");
    }

    #[test]
    fn strips_message_id_tags() {
        assert_eq!(normalize("hello [msg_id: abc-123]"), "hello");
        assert_eq!(normalize("[message_id: 42] hello there"), "hello there");
    }

    #[test]
    fn collapses_blank_lines() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            "plain text".to_string(),
            "[12:00:00] timestamped [msg_id: 1]".to_string(),
            "[12:34:56] [12:00:00] doubly timestamped".to_string(),
            format!("x\n{CONTEXT_BLOCK_OPEN}\ninjected\n{CONTEXT_BLOCK_CLOSE}\ny"),
            "a\n\n\n\nb\n\n\n".to_string(),
            String::new(),
        ];
        for input in inputs {
            let once = normalize(&input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn control_payload_requires_two_markers() {
        assert!(is_control_payload(
            r#"{"route": "topic", "confidence": 0.92}"#
        ));
        assert!(is_control_payload(
            r#"{"classification": {"topic_id": "t1"}}"#
        ));
        // Only one marker: treat as conversation.
        assert!(!is_control_payload(r#"{"route": "topic"}"#));
        // Not JSON-shaped at all.
        assert!(!is_control_payload("route confidence classification"));
        assert!(!is_control_payload("let's talk about the roadmap"));
    }

    #[test]
    fn summarize_collapses_and_bounds() {
        assert_eq!(summarize("  a\n  b\t c  ", 100), "a b c");
        let long = "word ".repeat(50);
        let s = summarize(&long, 20);
        assert_eq!(s.chars().count(), 20);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 100), "héllo wörld");
        let t = truncate_chars("héllo wörld", 6);
        assert_eq!(t.chars().count(), 6);
        assert!(t.ends_with('…'));
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn summarize_is_stable() {
        let text = "same input  every\n time";
        assert_eq!(summarize(text, 50), summarize(text, 50));
    }
}
