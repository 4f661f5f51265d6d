//! Fixed phrase heuristics applied to every piece of ingested text.
//!
//! Matching is plain case-insensitive substring search. All phrases are ASCII,
//! so byte offsets found in the ASCII-lowercased text are valid in the
//! original.

/// Saying this activates an inactive turn.
pub const WAKE_PHRASE: &str = "essence";

/// Any of these ends the turn and triggers a commit.
pub const COMMIT_PHRASES: [&str; 2] = ["over", "your turn"];

/// Any of these asks the client for a screenshot.
pub const SCREENSHOT_PHRASES: [&str; 7] = [
    "screenshot",
    "capture",
    "do you see this",
    "look at this",
    "take a screenshot",
    "take screenshot",
    "capture screen",
];

pub fn contains_wake_phrase(text: &str) -> bool {
    text.to_ascii_lowercase().contains(WAKE_PHRASE)
}

pub fn contains_screenshot_request(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    SCREENSHOT_PHRASES.iter().any(|p| lower.contains(p))
}

/// If `text` contains a commit phrase, returns the text with everything from
/// that phrase on removed, along with trailing whitespace and `.,?!`.
pub fn strip_commit_phrase(text: &str) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let start = COMMIT_PHRASES.iter().find_map(|p| lower.find(p))?;
    Some(
        text[..start]
            .trim()
            .trim_end_matches(['.', ',', '?', '!'])
            .trim_end(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_phrase_and_trailing_punctuation_are_stripped() {
        assert_eq!(
            strip_commit_phrase("Explain my login over"),
            Some("Explain my login")
        );
        assert_eq!(
            strip_commit_phrase("That is the API. Over."),
            Some("That is the API")
        );
        assert_eq!(strip_commit_phrase("Your turn"), Some(""));
        assert_eq!(strip_commit_phrase("still explaining"), None);
    }

    #[test]
    fn commit_phrases_are_checked_in_order() {
        // "over" wins even though "your turn" appears first in the text.
        assert_eq!(
            strip_commit_phrase("your turn, then over"),
            Some("your turn, then")
        );
    }

    #[test]
    fn commit_phrase_matches_inside_words() {
        assert_eq!(strip_commit_phrase("Give me an overview"), Some("Give me an"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(contains_wake_phrase("Hey ESSENCE, look"));
        assert!(contains_screenshot_request("Take A Screenshot please"));
        assert!(!contains_screenshot_request("nothing to see"));
    }
}
