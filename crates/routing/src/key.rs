//! Session key grammar.
//!
//! Three shapes carry meaning; everything else is an unscoped stream:
//! - `board:topic:<topicId>` — output belongs to a topic
//! - `board:task:<topicId>:<taskId>` — output belongs to a task
//! - `agent:<owner>:subagent:<child>` — a nested sub-agent session

/// Parsed form of a session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRef {
    Topic {
        topic_id: String,
    },
    Task {
        topic_id: String,
        task_id: String,
    },
    Subagent {
        owner: String,
        child: String,
    },
    /// No destination or relationship encoded in the key.
    Plain,
}

/// Parse a session key into its routing shape.
pub fn parse_session_key(key: &str) -> SessionRef {
    let parts: Vec<&str> = key.split(':').collect();
    match parts.as_slice() {
        ["board", "topic", topic_id] if !topic_id.is_empty() => SessionRef::Topic {
            topic_id: (*topic_id).to_string(),
        },
        ["board", "task", topic_id, task_id] if !topic_id.is_empty() && !task_id.is_empty() => {
            SessionRef::Task {
                topic_id: (*topic_id).to_string(),
                task_id: (*task_id).to_string(),
            }
        },
        ["agent", owner, "subagent", child] if !owner.is_empty() && !child.is_empty() => {
            SessionRef::Subagent {
                owner: (*owner).to_string(),
                child: (*child).to_string(),
            }
        },
        _ => SessionRef::Plain,
    }
}

/// Human-readable `(speaker, audience)` labels for a message on this session.
///
/// `outbound` is true when the agent is producing the message (assistant
/// reply, run summary), false when it is receiving one. Display metadata
/// only; routing never depends on these.
pub fn speaker_labels(session: &SessionRef, outbound: bool) -> (String, String) {
    match session {
        SessionRef::Subagent { owner, child } => {
            let owner_label = format!("{owner} (agent)");
            let child_label = format!("{child} (subagent)");
            if outbound {
                (child_label, owner_label)
            } else {
                (owner_label, child_label)
            }
        },
        _ => {
            if outbound {
                ("assistant".into(), "user".into())
            } else {
                ("user".into(), "assistant".into())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_topic_keys() {
        assert_eq!(
            parse_session_key("board:topic:abc123"),
            SessionRef::Topic {
                topic_id: "abc123".into()
            }
        );
    }

    #[test]
    fn parses_task_keys() {
        assert_eq!(
            parse_session_key("board:task:abc123:42"),
            SessionRef::Task {
                topic_id: "abc123".into(),
                task_id: "42".into()
            }
        );
    }

    #[test]
    fn parses_subagent_keys() {
        assert_eq!(
            parse_session_key("agent:main:subagent:xyz"),
            SessionRef::Subagent {
                owner: "main".into(),
                child: "xyz".into()
            }
        );
    }

    #[test]
    fn everything_else_is_plain() {
        for key in [
            "",
            "main",
            "tg:12345",
            "board:topic:",
            "board:task:abc123",
            "board:task:abc123:",
            "agent:main",
            "agent::subagent:x",
            "board:topic:a:extra",
        ] {
            assert_eq!(parse_session_key(key), SessionRef::Plain, "key: {key:?}");
        }
    }

    #[test]
    fn labels_for_plain_sessions() {
        let session = parse_session_key("tg:12345");
        assert_eq!(
            speaker_labels(&session, false),
            ("user".into(), "assistant".into())
        );
        assert_eq!(
            speaker_labels(&session, true),
            ("assistant".into(), "user".into())
        );
    }

    #[test]
    fn labels_for_subagent_sessions() {
        let session = parse_session_key("agent:main:subagent:xyz");
        assert_eq!(
            speaker_labels(&session, false),
            ("main (agent)".into(), "xyz (subagent)".into())
        );
        assert_eq!(
            speaker_labels(&session, true),
            ("xyz (subagent)".into(), "main (agent)".into())
        );
    }
}
