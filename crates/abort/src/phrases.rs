//! Multilingual abort-phrase vocabulary and the canonical `/stop` command.
//!
//! Matching is always against the *entire* normalized message, never a
//! substring search — that's what keeps polite requests like "please do
//! not do that" from tripping the trigger.

use std::sync::OnceLock;

use regex::Regex;

/// Single-word/short-phrase stop vocabulary, matched after normalization.
const BASE_PHRASES: &[&str] = &[
    "stop",
    "abort",
    "wait",
    "exit",
    "interrupt",
    "halt",
    "anhalten",
    "aufhören",
    "hoer auf",
    "stopp",
    "detén",
    "arrête",
    "停止",
    "やめて",
    "止めて",
    "रुको",
    "توقف",
    "стоп",
    "остановись",
    "прекрати",
    "pare",
];

/// Suffixes accepted after `"stop "` to form a compositional trigger, e.g.
/// `"stop openclaw"`, `"stop do not do anything"`.
const COMPOSITIONAL_SUFFIXES: &[&str] = &["openclaw", "action", "run", "agent", "do not do anything"];

fn stop_command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/stop(@[a-z0-9_]+)?[.!?]*$").expect("valid regex"))
}

/// Lower-case, trim, and collapse the punctuation/whitespace noise a human
/// typing a stop phrase is likely to add.
fn normalize(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let trimmed: String = lower
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?' || c.is_whitespace())
        .to_string();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True if `raw` is either the canonical `/stop` command (optionally
/// `@botusername`-suffixed, punctuation-tolerant) or matches the
/// multilingual abort-phrase vocabulary — standalone or compositional
/// (`"stop <openclaw|action|run|agent|do not do anything>"`).
pub fn is_abort_trigger(raw: &str) -> bool {
    is_abort_trigger_with_extra(raw, &[])
}

/// As [`is_abort_trigger`], plus operator-configured extra phrases
/// (`AbortConfig::extra_phrases`) matched the same way as the built-in
/// single-word vocabulary — full-message, case-insensitive.
pub fn is_abort_trigger_with_extra(raw: &str, extra_phrases: &[String]) -> bool {
    let lower_trimmed = raw.trim().to_lowercase();
    if stop_command_regex().is_match(&lower_trimmed) {
        return true;
    }

    let normalized = normalize(raw);
    if BASE_PHRASES.contains(&normalized.as_str()) {
        return true;
    }

    if extra_phrases.iter().any(|p| p.trim().to_lowercase() == normalized) {
        return true;
    }

    if let Some(rest) = normalized.strip_prefix("stop ") {
        if COMPOSITIONAL_SUFFIXES.contains(&rest) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_stop_command_variants() {
        assert!(is_abort_trigger("/stop"));
        assert!(is_abort_trigger("/STOP"));
        assert!(is_abort_trigger("/stop@openclaw_bot"));
        assert!(is_abort_trigger("/stop."));
        assert!(is_abort_trigger("/stop!"));
    }

    #[test]
    fn not_a_stop_command_if_extra_text() {
        assert!(!is_abort_trigger("/stopwatch"));
        assert!(!is_abort_trigger("please /stop now"));
    }

    #[test]
    fn single_word_vocabulary() {
        assert!(is_abort_trigger("stop"));
        assert!(is_abort_trigger("Stop"));
        assert!(is_abort_trigger("  stop  "));
        assert!(is_abort_trigger("abort"));
        assert!(is_abort_trigger("停止"));
        assert!(is_abort_trigger("стоп"));
    }

    #[test]
    fn compositional_vocabulary() {
        assert!(is_abort_trigger("stop openclaw"));
        assert!(is_abort_trigger("stop action"));
        assert!(is_abort_trigger("stop do not do anything"));
    }

    #[test]
    fn extra_phrases_are_matched_full_message() {
        let extra = vec!["knock it off".to_string()];
        assert!(is_abort_trigger_with_extra("knock it off", &extra));
        assert!(!is_abort_trigger_with_extra("please knock it off now", &extra));
        assert!(!is_abort_trigger("knock it off")); // not in the built-in vocabulary
    }

    #[test]
    fn polite_requests_do_not_trigger() {
        assert!(!is_abort_trigger("please do not do that"));
        assert!(!is_abort_trigger("can you stop doing that please"));
        assert!(!is_abort_trigger("I don't want you to stop yet"));
    }
}
