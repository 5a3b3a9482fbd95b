//! Mention-pattern matching for group chats (spec.md §4.3, §6
//! `normalizeAllowEntry`/per-adapter quirks territory).
//!
//! `oc_access::Evaluator` only ever sees a precomputed `was_mentioned`
//! bool — it has no notion of raw message bodies or per-channel mention
//! syntax. Resolving that bool from `GroupConfig.mention_pattern` against
//! the raw inbound body is the orchestrator's job, done once per inbound
//! message before the access evaluator runs.

use regex::Regex;

/// True if `pattern` (an operator-configured regex fragment) matches
/// somewhere in `body`, case-insensitively. Falls back to a plain
/// substring check if `pattern` fails to compile as a regex — an
/// operator typo should degrade gracefully, not drop every group
/// message.
pub fn was_mentioned(body: &str, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else {
        return false;
    };

    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => re.is_match(body),
        Err(_) => body.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pattern_never_counts_as_mentioned() {
        assert!(!was_mentioned("hey @openclaw help", None));
    }

    #[test]
    fn literal_pattern_matches_case_insensitively() {
        assert!(was_mentioned("Hey @OpenClaw, help", Some("@openclaw")));
        assert!(!was_mentioned("hey there", Some("@openclaw")));
    }

    #[test]
    fn regex_fragment_pattern_matches() {
        assert!(was_mentioned("hey @openclaw_bot help", Some(r"@openclaw(_bot)?")));
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        assert!(was_mentioned("call (openclaw) now", Some("(openclaw")));
        assert!(!was_mentioned("nothing here", Some("(openclaw")));
    }
}
