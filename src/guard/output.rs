//! Output guard: deterministic cleanup of generated answers.

use regex::Regex;

use crate::config::GuardrailsConfig;

/// Returned in place of an empty answer.
pub const EMPTY_ANSWER_NOTICE: &str = "I wasn't able to generate a response. Please try again.";

/// Appended to answers cut at `max_output_length`.
pub const TRUNCATION_NOTICE: &str = "\n\n[Response truncated due to length.]";

/// Characters held back from the limit before looking for a sentence end.
const TRUNCATION_MARGIN: usize = 50;

/// Markers some models use when they echo their instructions.
const LEAKAGE_PATTERNS: &[&str] = &[
    r"(?s)<\|system\|>.*?<\|/system\|>",
    r"(?s)\[INST\].*?\[/INST\]",
    r"(?s)<<SYS>>.*?<</SYS>>",
];

#[derive(Debug, Clone)]
pub struct OutputGuard {
    max_length: usize,
    system_prompt: String,
    leakage: Vec<Regex>,
}

impl OutputGuard {
    pub fn new(config: &GuardrailsConfig) -> Result<Self, regex::Error> {
        let leakage = LEAKAGE_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            max_length: config.max_output_length,
            system_prompt: config.system_prompt.trim().to_string(),
            leakage,
        })
    }

    /// Clean a generated answer before it is returned.
    pub fn sanitize(&self, answer: &str) -> String {
        let mut output = answer.trim().to_string();

        for pattern in &self.leakage {
            if pattern.is_match(&output) {
                tracing::warn!(pattern = %pattern.as_str(), "Removed instruction leakage from answer");
                output = pattern.replace_all(&output, "").into_owned();
            }
        }

        if !self.system_prompt.is_empty() && output.contains(&self.system_prompt) {
            tracing::warn!("Removed echoed system prompt from answer");
            output = output.replace(&self.system_prompt, "");
        }

        let output = output.trim();
        if output.is_empty() {
            return EMPTY_ANSWER_NOTICE.to_string();
        }

        self.truncate(output)
    }

    /// Cut to the length limit, preferring a sentence boundary near the end.
    fn truncate(&self, output: &str) -> String {
        if output.chars().count() <= self.max_length {
            return output.to_string();
        }

        let keep = self.max_length.saturating_sub(TRUNCATION_MARGIN);
        let mut cut: String = output.chars().take(keep).collect();

        let cut_chars = cut.chars().count();
        if let Some(idx) = cut.rfind('.') {
            let sentence_end_chars = cut[..idx].chars().count();
            if sentence_end_chars * 5 > cut_chars * 4 {
                cut.truncate(idx + 1);
            }
        }

        cut.push_str(TRUNCATION_NOTICE);
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> OutputGuard {
        OutputGuard::new(&GuardrailsConfig::default()).unwrap()
    }

    fn guard_with_limit(max_output_length: usize) -> OutputGuard {
        OutputGuard::new(&GuardrailsConfig {
            max_output_length,
            ..GuardrailsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_valid_output_unchanged() {
        assert_eq!(
            guard().sanitize("This is a valid response."),
            "This is a valid response."
        );
    }

    #[test]
    fn test_empty_output_replaced() {
        assert_eq!(guard().sanitize(""), EMPTY_ANSWER_NOTICE);
        assert_eq!(guard().sanitize("   "), EMPTY_ANSWER_NOTICE);
    }

    #[test]
    fn test_strips_whitespace() {
        assert_eq!(guard().sanitize("  hello  "), "hello");
    }

    #[test]
    fn test_removes_instruction_leakage() {
        let raw = "<<SYS>>secret rules\nmore<</SYS>>The answer is 4.";
        assert_eq!(guard().sanitize(raw), "The answer is 4.");

        let raw = "[INST] do x [/INST] Done.";
        assert_eq!(guard().sanitize(raw), "Done.");
    }

    #[test]
    fn test_removes_echoed_system_prompt() {
        let config = GuardrailsConfig {
            system_prompt: "You are a terse assistant.".to_string(),
            ..GuardrailsConfig::default()
        };
        let guard = OutputGuard::new(&config).unwrap();
        assert_eq!(
            guard.sanitize("You are a terse assistant. Paris."),
            "Paris."
        );
    }

    #[test]
    fn test_only_leakage_becomes_notice() {
        assert_eq!(
            guard().sanitize("<|system|>hidden<|/system|>"),
            EMPTY_ANSWER_NOTICE
        );
    }

    #[test]
    fn test_truncates_long_output() {
        let guard = guard_with_limit(100);
        let output = guard.sanitize(&"a".repeat(500));
        assert!(output.ends_with(TRUNCATION_NOTICE));
        assert_eq!(output.chars().count(), 50 + TRUNCATION_NOTICE.chars().count());
        assert!(output.chars().count() <= 100);
    }

    #[test]
    fn test_truncation_prefers_late_sentence_end() {
        let guard = guard_with_limit(100);
        let text = format!("{}. {}", "a".repeat(45), "b".repeat(200));
        let output = guard.sanitize(&text);
        assert_eq!(output, format!("{}.{}", "a".repeat(45), TRUNCATION_NOTICE));
    }

    #[test]
    fn test_truncation_ignores_early_sentence_end() {
        let guard = guard_with_limit(100);
        let text = format!("Short. {}", "b".repeat(200));
        let output = guard.sanitize(&text);
        assert!(output.starts_with("Short. bbb"));
        assert_eq!(output.chars().count(), 50 + TRUNCATION_NOTICE.chars().count());
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let guard = guard_with_limit(64);
        let output = guard.sanitize(&"é".repeat(300));
        assert!(output.ends_with(TRUNCATION_NOTICE));
        assert!(output.starts_with(&"é".repeat(14)));
    }
}
