//! Deterministic rendering of an assembled context draft.

use pinboard_text::truncate_chars;

/// Everything the engine gathered, already formatted as display lines.
#[derive(Debug, Default)]
pub struct ContextDraft {
    pub intent: String,
    pub signals: Vec<String>,
    pub recent_turns: Vec<String>,
    pub topics: Vec<String>,
    pub tasks: Vec<String>,
    pub timeline: Vec<String>,
    pub notes: Vec<String>,
    pub topic_memory: Vec<String>,
}

impl ContextDraft {
    /// True when nothing beyond the intent line was gathered. Rendering an
    /// intent-only block would be noise, so the engine suppresses it.
    pub fn is_empty(&self) -> bool {
        self.recent_turns.is_empty()
            && self.topics.is_empty()
            && self.tasks.is_empty()
            && self.timeline.is_empty()
            && self.notes.is_empty()
            && self.topic_memory.is_empty()
    }
}

fn push_section(out: &mut Vec<String>, header: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    let mut section = String::from(header);
    for line in lines {
        section.push_str("\n- ");
        section.push_str(line);
    }
    out.push(section);
}

/// Render the draft in fixed section order and hard-truncate to the char
/// budget. Returns `None` for an empty draft.
pub fn render(draft: &ContextDraft, char_budget: usize) -> Option<String> {
    if draft.is_empty() {
        return None;
    }

    let mut sections: Vec<String> = vec![format!("Intent: {}", draft.intent)];
    push_section(&mut sections, "Signals:", &draft.signals);
    push_section(&mut sections, "Recent turns:", &draft.recent_turns);
    push_section(&mut sections, "Likely topics:", &draft.topics);
    push_section(&mut sections, "Likely tasks:", &draft.tasks);
    push_section(&mut sections, "Timeline:", &draft.timeline);
    push_section(&mut sections, "Curated notes:", &draft.notes);
    push_section(&mut sections, "Topic memory:", &draft.topic_memory);

    Some(truncate_chars(&sections.join("\n\n"), char_budget))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> ContextDraft {
        ContextDraft {
            intent: "deploy staging".into(),
            signals: vec![],
            recent_turns: vec!["user: let's deploy".into()],
            topics: vec!["infra (t1): cluster work".into()],
            tasks: vec!["roll out v2 [t1/42, open]".into()],
            timeline: vec!["user: let's deploy".into(), "assistant: on it".into()],
            notes: vec!["staging needs the new secrets".into()],
            topic_memory: vec!["infra: last deploy failed on quota".into()],
        }
    }

    #[test]
    fn empty_draft_renders_nothing() {
        let draft = ContextDraft {
            intent: "hello".into(),
            ..Default::default()
        };
        assert!(render(&draft, 6000).is_none());
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let text = render(&sample_draft(), 6000).unwrap();
        let order = [
            "Intent:",
            "Recent turns:",
            "Likely topics:",
            "Likely tasks:",
            "Timeline:",
            "Curated notes:",
            "Topic memory:",
        ];
        let positions: Vec<usize> = order.iter().map(|h| text.find(h).unwrap()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
        // Absent sections leave no header behind.
        assert!(!text.contains("Signals:"));
    }

    #[test]
    fn output_never_exceeds_budget() {
        let mut draft = sample_draft();
        for i in 0..500 {
            draft.timeline.push(format!("speaker: long line number {i} with some padding text"));
        }
        for budget in [10, 100, 1000, 6000] {
            let text = render(&draft, budget).unwrap();
            assert!(text.chars().count() <= budget);
        }
    }

    #[test]
    fn truncation_is_char_boundary_safe() {
        let draft = ContextDraft {
            intent: "héllo wörld with ünïcöde çontent".into(),
            topics: vec!["töpic (t1): ünïcöde äll thé wäy döwn".repeat(50)],
            ..Default::default()
        };
        let text = render(&draft, 40).unwrap();
        assert!(text.chars().count() <= 40);
        assert!(text.ends_with('…'));
    }
}
