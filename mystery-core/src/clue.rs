//! Clue detection: keyword-substring scanning of generated replies.
//!
//! Deterministic and independent of any model call. A character's clue
//! keywords are lowercase substrings; the first configured keyword found in
//! a reply (keyword order, not reply order) is reported as the leak.

/// Scan a reply for the first leaked keyword.
///
/// Matching is case-insensitive substring containment. Returns the formatted
/// clue description, e.g. `Tom Berger mentioned '21:15'`.
pub fn detect_clue(reply: &str, character_name: &str, keywords: &[String]) -> Option<String> {
    let reply_lower = reply.to_lowercase();

    keywords
        .iter()
        .find(|keyword| reply_lower.contains(keyword.to_lowercase().as_str()))
        .map(|keyword| format_clue(character_name, keyword))
}

/// The canonical clue string for a leaked keyword.
pub fn format_clue(character_name: &str, keyword: &str) -> String {
    format!("{character_name} mentioned '{keyword}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec![
            "21:15".to_string(),
            "access card".to_string(),
            "trophy".to_string(),
        ]
    }

    #[test]
    fn test_detects_keyword() {
        let clue = detect_clue(
            "I got in around 21:15, but only briefly.",
            "Tom Berger",
            &keywords(),
        );
        assert_eq!(clue.as_deref(), Some("Tom Berger mentioned '21:15'"));
    }

    #[test]
    fn test_case_insensitive() {
        let clue = detect_clue("My ACCESS CARD was in my jacket.", "Tom Berger", &keywords());
        assert_eq!(clue.as_deref(), Some("Tom Berger mentioned 'access card'"));
    }

    #[test]
    fn test_keyword_order_wins_over_reply_order() {
        // "trophy" appears first in the reply, but "21:15" is configured first.
        let clue = detect_clue(
            "The trophy? I saw it Sunday around 21:15.",
            "Tom Berger",
            &keywords(),
        );
        assert_eq!(clue.as_deref(), Some("Tom Berger mentioned '21:15'"));
    }

    #[test]
    fn test_no_match() {
        assert!(detect_clue("I was at home all evening.", "Tom Berger", &keywords()).is_none());
    }

    #[test]
    fn test_empty_keywords() {
        assert!(detect_clue("Anything at all 21:15.", "Tom Berger", &[]).is_none());
    }
}
