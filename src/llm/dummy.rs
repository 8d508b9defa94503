//! Canned-response generator used when no real backend can answer.
//!
//! Replies are picked from static templates by keyword category and by the
//! message's position in the conversation, so the same input always yields
//! the same output.

use regex::Regex;
use std::sync::LazyLock;

static GREETING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(hello|hi|hey)\b").expect("greeting pattern is valid"));

static MODEL_TOPIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(llms?|models?)\b").expect("model pattern is valid"));

static DOCUMENT_TOPIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(documents?|files?|search(es|ing)?)\b").expect("document pattern is valid")
});

static RETRIEVAL_TOPIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(rag|retrieval)\b").expect("retrieval pattern is valid"));

const GREETINGS: &[&str] = &[
    "Hello! I'm your RAG chatbot. I answer from a local model when one is running.",
    "Hi there! I use local or hosted AI when possible, with fallbacks when not.",
    "Hey! No model is reachable right now, but I'm still here to help.",
];

const MODEL_REPLIES: &[&str] = &[
    "I can use a local model through Ollama or a hosted chat API, but neither is reachable right now, so these are canned replies.",
    "No language model is answering at the moment. Start a local model server or configure an API key to get real answers.",
];

const DOCUMENT_REPLIES: &[&str] = &[
    "I'm built for document search! Add files to the data folder and I'll use them as context once a model is available.",
    "Document search works best with a model behind it. Mine is offline right now, so I can only point you at the data folder.",
];

const RETRIEVAL_REPLIES: &[&str] = &[
    "RAG (Retrieval-Augmented Generation) combines document search with AI generation. The generation half is offline right now.",
    "Retrieval-augmented generation is my specialty, but I need a running model to put the retrieved context to use.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Greeting,
    Model,
    Documents,
    Retrieval,
    Other,
}

fn categorize(message: &str) -> Category {
    if GREETING.is_match(message) {
        Category::Greeting
    } else if MODEL_TOPIC.is_match(message) {
        Category::Model
    } else if DOCUMENT_TOPIC.is_match(message) {
        Category::Documents
    } else if RETRIEVAL_TOPIC.is_match(message) {
        Category::Retrieval
    } else {
        Category::Other
    }
}

/// Deterministic fallback generator. Never fails and never returns empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyGenerator;

impl DummyGenerator {
    /// Reply to `message`, which is turn number `position` in its conversation.
    pub fn reply(&self, message: &str, position: usize) -> String {
        let message = message.trim();
        let pick = |templates: &[&str]| templates[position % templates.len()].to_string();

        match categorize(message) {
            Category::Greeting => pick(GREETINGS),
            Category::Model => pick(MODEL_REPLIES),
            Category::Documents => pick(DOCUMENT_REPLIES),
            Category::Retrieval => pick(RETRIEVAL_REPLIES),
            Category::Other if message.is_empty() => {
                "I didn't catch a message there. Ask me anything!".into()
            }
            Category::Other => format!(
                "I received your message: \"{message}\". No model is available right now, so this is a canned reply."
            ),
        }
    }

    pub fn is_greeting_template(text: &str) -> bool {
        GREETINGS.contains(&text)
    }
}
