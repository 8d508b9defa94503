//! Prompt formatting for the two backend wire shapes.

use crate::{ContextItem, HistoryEntry, Role, SourceKind};
use serde::Serialize;

/// Trailing history turns included in any prompt.
pub const HISTORY_WINDOW: usize = 6;

const COMPLETION_INSTRUCTION: &str = "You are a helpful AI assistant that answers questions based on provided context. \
Use the context information to provide accurate and relevant answers. \
If the context doesn't contain relevant information, say so and provide a general helpful response.";

const CHAT_INSTRUCTION: &str = "You are a helpful AI assistant. Provide concise, direct answers. \
Keep responses under 2-3 sentences unless more detail is specifically requested. \
Use provided context when relevant. Do not continue the conversation or ask follow-up questions.";

const SEARCH_NOTE: &str =
    "Note: Some context includes current web search results for up-to-date information.";

fn recent(history: &[HistoryEntry]) -> &[HistoryEntry] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

/// Single-string completion prompt for the local model server.
pub fn completion_prompt(text: &str, context: &[ContextItem], history: &[HistoryEntry]) -> String {
    let mut prompt = String::with_capacity(512);
    prompt.push_str(COMPLETION_INSTRUCTION);
    prompt.push_str("\n\n");

    if !context.is_empty() {
        prompt.push_str("Context information:\n");
        for item in context {
            prompt.push_str("- ");
            prompt.push_str(&item.text);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    let turns = recent(history);
    if !turns.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for entry in turns {
            let speaker = match entry.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{speaker}: {}\n", entry.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Human: {text}\n"));
    prompt.push_str("Assistant: ");
    prompt
}

/// One message in a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Message list for a chat-completion API: system instruction with the
/// context block, trailing history, then the current message.
pub fn chat_messages(text: &str, context: &[ContextItem], history: &[HistoryEntry]) -> Vec<ChatMessage> {
    let mut system = String::from(CHAT_INSTRUCTION);
    if !context.is_empty() {
        system.push_str("\n\nContext:\n");
        for item in context {
            system.push_str("- ");
            system.push_str(&item.text);
            system.push('\n');
        }
        if context.iter().any(|item| item.source_kind == SourceKind::Search) {
            system.push('\n');
            system.push_str(SEARCH_NOTE);
        }
    }

    let turns = recent(history);
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ChatMessage {
        role: "system",
        content: system,
    });
    messages.extend(turns.iter().map(|entry| ChatMessage {
        role: match entry.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: entry.content.clone(),
    }));
    messages.push(ChatMessage {
        role: "user",
        content: text.to_string(),
    });
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(count: usize) -> Vec<HistoryEntry> {
        (0..count)
            .map(|index| {
                let role = if index % 2 == 0 { Role::User } else { Role::Assistant };
                HistoryEntry::new(role, format!("turn {index}"))
            })
            .collect()
    }

    #[test]
    fn completion_prompt_ends_with_assistant_cue() {
        let context = vec![ContextItem::new("Paris is in France", SourceKind::Document, "geo.txt")];
        let prompt = completion_prompt("Where is Paris?", &context, &turns(2));

        assert!(prompt.starts_with("You are a helpful AI assistant"));
        assert!(prompt.contains("- Paris is in France\n"));
        assert!(prompt.contains("Human: turn 0\nAssistant: turn 1\n"));
        assert!(prompt.ends_with("Human: Where is Paris?\nAssistant: "));
    }

    #[test]
    fn only_trailing_history_window_is_used() {
        let prompt = completion_prompt("next", &[], &turns(10));
        assert!(!prompt.contains("turn 3\n"));
        assert!(prompt.contains("turn 4\n"));
        assert!(prompt.contains("turn 9\n"));

        let messages = chat_messages("next", &[], &turns(10));
        // system + 6 history + current
        assert_eq!(messages.len(), 8);
        assert_eq!(messages[1].content, "turn 4");
    }

    #[test]
    fn search_note_only_with_search_context() {
        let documents = vec![ContextItem::new("doc", SourceKind::Document, "a.md")];
        let messages = chat_messages("q", &documents, &[]);
        assert!(!messages[0].content.contains("web search"));

        let mut mixed = documents.clone();
        mixed.push(ContextItem::new("[Search Result 1] x", SourceKind::Search, "https://x"));
        let messages = chat_messages("q", &mixed, &[]);
        assert!(messages[0].content.contains("- doc\n- [Search Result 1] x\n"));
        assert!(messages[0].content.ends_with(SEARCH_NOTE));
    }

    #[test]
    fn chat_history_roles_are_preserved() {
        let messages = chat_messages("now", &[], &turns(2));
        let roles: Vec<_> = messages.iter().map(|message| message.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("now"));
    }
}
