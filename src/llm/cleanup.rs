//! Normalization of raw model output.
//!
//! Small local models often keep writing the conversation past their own
//! turn ("Human: ..."), or echo the role cue. [`clean_response`] strips
//! that, then bounds the length. It is pure and idempotent:
//! `clean_response(&clean_response(x)) == clean_response(x)`.

/// Character budget for a cleaned reply.
pub const MAX_RESPONSE_CHARS: usize = 1000;

/// Line prefixes that mean the model started a new turn.
const CONTINUATION_MARKERS: &[&str] = &["Human:", "User:"];

const ROLE_CUE: &str = "Assistant:";

/// Clean a model reply with the default budget.
pub fn clean_response(raw: &str) -> String {
    clean_response_with_budget(raw, MAX_RESPONSE_CHARS)
}

pub fn clean_response_with_budget(raw: &str, max_chars: usize) -> String {
    let mut text = raw.trim();
    while let Some(rest) = text.strip_prefix(ROLE_CUE) {
        text = rest.trim_start();
    }

    let text = cut_at_continuation(text).trim();
    truncate_to_budget(text, max_chars)
}

/// Drop everything from the first line (after the first) that opens a new turn.
fn cut_at_continuation(text: &str) -> &str {
    let mut offset = 0;
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            let start = line.trim_start();
            if CONTINUATION_MARKERS.iter().any(|marker| start.starts_with(marker)) {
                return &text[..offset];
            }
        }
        offset += line.len() + 1;
    }
    text
}

fn truncate_to_budget(text: &str, max_chars: usize) -> String {
    let Some((window_end, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let window = &text[..window_end];

    // Prefer ending on a full sentence when one ends past the halfway mark.
    if let Some(index) = window.rfind(['.', '!', '?']) {
        let sentence = &window[..=index];
        if sentence.chars().count() > max_chars / 2 {
            return sentence.to_string();
        }
    }

    let keep = max_chars.saturating_sub(3);
    let cut = window
        .char_indices()
        .nth(keep)
        .map_or(window.len(), |(byte_index, _)| byte_index);
    format!("{}...", window[..cut].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_and_strips_role_cue() {
        assert_eq!(clean_response("  Assistant: Assistant:  Hi there.  "), "Hi there.");
    }

    #[test]
    fn cuts_at_next_human_turn() {
        let raw = "Paris is the capital.\nHuman: and Spain?\nAssistant: Madrid.";
        assert_eq!(clean_response(raw), "Paris is the capital.");
    }

    #[test]
    fn first_line_marker_is_kept() {
        assert_eq!(clean_response("User: said hi"), "User: said hi");
    }

    #[test]
    fn long_reply_ends_on_sentence_boundary() {
        let sentence = "This sentence is exactly forty chars ok. ";
        let raw = sentence.repeat(40);
        let cleaned = clean_response(&raw);
        assert!(cleaned.chars().count() <= MAX_RESPONSE_CHARS);
        assert!(cleaned.ends_with('.'));
    }

    #[test]
    fn long_reply_without_sentences_gets_ellipsis() {
        let raw = "word ".repeat(400);
        let cleaned = clean_response(&raw);
        assert!(cleaned.ends_with("..."));
        assert!(cleaned.chars().count() <= MAX_RESPONSE_CHARS);
    }

    #[test]
    fn multibyte_text_is_truncated_on_char_boundaries() {
        let raw = "é".repeat(50);
        let cleaned = clean_response_with_budget(&raw, 10);
        assert_eq!(cleaned, format!("{}...", "é".repeat(7)));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(clean_response("   "), "");
        assert_eq!(clean_response("Assistant:"), "");
    }

    proptest! {
        #[test]
        fn cleanup_is_idempotent(
            raw in "(Assistant: |Human: |User: |\n| |[a-zé.!?]{1,40}){0,80}"
        ) {
            let once = clean_response_with_budget(&raw, 120);
            let twice = clean_response_with_budget(&once, 120);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn cleanup_respects_budget(raw in ".{0,400}") {
            let cleaned = clean_response_with_budget(&raw, 100);
            prop_assert!(cleaned.chars().count() <= 100);
        }
    }
}
