//! Builds the single generation request sent to the model.

use chrono::{TimeZone, Utc};
use std::fmt::Write as _;

use super::contract::Contract;
use super::model_client::RequestPayload;
use super::tools::TOOLS;
use crate::config::{HistoryConfig, ModelConfig, SignalConfig};
use crate::ingest::types::Signal;

pub struct PromptComposer<'a> {
    contract: &'a Contract,
    model: &'a ModelConfig,
    signal_limit: usize,
    history_chars: usize,
}

impl<'a> PromptComposer<'a> {
    pub fn new(
        contract: &'a Contract,
        model: &'a ModelConfig,
        signals: &SignalConfig,
        history: &HistoryConfig,
    ) -> Self {
        Self {
            contract,
            model,
            signal_limit: signals.prompt_limit,
            history_chars: history.prompt_chars,
        }
    }

    pub fn build_request(
        &self,
        now: u64,
        signals: &[Signal],
        history: &[String],
        feedback: Option<&str>,
    ) -> RequestPayload {
        RequestPayload {
            prompt: self.compose(now, signals, history, feedback),
            temperature: self.model.temperature,
            max_output_tokens: self.model.max_output_tokens,
        }
    }

    fn compose(
        &self,
        now: u64,
        signals: &[Signal],
        history: &[String],
        feedback: Option<&str>,
    ) -> String {
        let c = self.contract;
        let mut p = String::with_capacity(8 * 1024);

        let date = Utc
            .timestamp_opt(now as i64, 0)
            .single()
            .map(|d| d.format("%A, %B %-d, %Y").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            p,
            "You write short social posts that help builders discover useful AI tools. Today is {date}."
        );
        p.push('\n');

        p.push_str("TOOL ACTIVITY FROM THE LAST 24 HOURS (use only these as facts):\n");
        if signals.is_empty() {
            p.push_str("- none available; write evergreen tips about well-known tools\n");
        }
        for (i, s) in signals.iter().take(self.signal_limit).enumerate() {
            let _ = write!(p, "{}. [{} | {}] {}", i + 1, s.source, s.age_label(now), s.title);
            if let Some(url) = &s.url {
                let _ = write!(p, " ({url})");
            }
            p.push('\n');
        }
        p.push('\n');

        if !history.is_empty() {
            p.push_str("ALREADY PUBLISHED (do not repeat these topics or phrasings):\n");
            for h in history {
                let short: String = h.chars().take(self.history_chars).collect();
                let _ = writeln!(p, "- {short}");
            }
            p.push('\n');
        }

        let _ = writeln!(p, "HARD REQUIREMENTS (every single post):");
        let _ = writeln!(p, "- Write exactly {} posts.", c.target_count);
        let _ = writeln!(
            p,
            "- Each post is {} to {} characters long, counting every character including spaces, links and hashtags.",
            c.min_len, c.max_len
        );
        let _ = writeln!(
            p,
            "- Start with a one-word prefix and a colon, for example \"Tool:\" or \"Workflow:\"."
        );
        let _ = writeln!(p, "- Include at least one emoji.");
        let _ = writeln!(
            p,
            "- Use between {} and {} hashtags, placed at the end.",
            c.min_tags, c.max_tags
        );
        let _ = writeln!(p, "- Mention the tool's official @handle.");
        let _ = writeln!(p, "- Include one full https:// link to the tool.");
        let _ = writeln!(
            p,
            "- End with a complete sentence; never stop on \"and\", \"with\", \"for\" or similar."
        );
        let _ = writeln!(
            p,
            "- Never use these words: {}.",
            c.banned_phrases.join(", ")
        );
        let _ = writeln!(
            p,
            "- Describe what a builder can do with the tool, not news about the company."
        );
        let _ = writeln!(p, "- Every post covers a different tool or use case.");
        p.push('\n');

        p.push_str("Known handles and links:\n");
        for t in TOOLS.iter() {
            let _ = writeln!(p, "- {} {} {}", t.name, t.handle, t.link);
        }
        p.push('\n');

        p.push_str("OUTPUT: return only JSON shaped like\n");
        p.push_str(r#"{"tweets":[{"text":"...","sourceAge":"3h ago"}]}"#);
        p.push('\n');

        if let Some(fb) = feedback.filter(|f| !f.trim().is_empty()) {
            p.push('\n');
            p.push_str("YOUR PREVIOUS ATTEMPT WAS REJECTED. Fix every problem below:\n");
            p.push_str(fb.trim_end());
            p.push('\n');
        }

        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(title: &str, age_secs: u64, now: u64) -> Signal {
        Signal {
            title: title.into(),
            url: Some("https://example.com/a".into()),
            source: "Show HN".into(),
            timestamp_secs: now - age_secs,
        }
    }

    #[test]
    fn request_states_contract_and_signals() {
        let contract = Contract::default();
        let model = ModelConfig::default();
        let composer = PromptComposer::new(
            &contract,
            &model,
            &SignalConfig::default(),
            &HistoryConfig::default(),
        );
        let now = 1_760_000_000;
        let req = composer.build_request(
            now,
            &[signal("Show HN: a CLI for local LLM agents", 7_300, now)],
            &["Tool: an older post about Cursor".to_string()],
            None,
        );
        assert!(req.prompt.contains("exactly 10 posts"));
        assert!(req.prompt.contains("270 to 275 characters"));
        assert!(req.prompt.contains("[Show HN | 2h ago] Show HN: a CLI for local LLM agents"));
        assert!(req.prompt.contains("- Tool: an older post about Cursor"));
        assert!(req.prompt.contains("breaking"));
        assert!(!req.prompt.contains("PREVIOUS ATTEMPT"));
        assert!((req.temperature - model.temperature).abs() < f32::EPSILON);
    }

    #[test]
    fn feedback_block_is_appended_verbatim() {
        let contract = Contract::default();
        let model = ModelConfig::default();
        let composer = PromptComposer::new(
            &contract,
            &model,
            &SignalConfig::default(),
            &HistoryConfig::default(),
        );
        let fb = "- post 3: length 200 outside 270..=275\n- expected 10 posts, got 7";
        let req = composer.build_request(0, &[], &[], Some(fb));
        assert!(req.prompt.contains("PREVIOUS ATTEMPT"));
        assert!(req.prompt.contains(fb));
        assert!(req.prompt.contains("none available"));
    }
}
