//! Prompt text and context assembly.

use warden_core::{ChatMessage, ConversationTurn};

/// Base system prompt for chat replies.
pub const ASSISTANT_PROMPT: &str = "You are a helpful AI assistant.";

/// System prompt for the summarizer.
pub const SUMMARIZER_PROMPT: &str = "You are a helpful assistant that creates concise summaries \
of conversations. Summarize the key points and context in 2-3 sentences.";

/// Token cap for summaries.
pub const SUMMARY_MAX_TOKENS: u32 = 256;

/// Assistant system prompt, with the running summary appended when present.
pub fn assistant_prompt(summary: Option<&str>) -> String {
    match summary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(summary) => format!("{ASSISTANT_PROMPT} Previous conversation summary: {summary}"),
        None => ASSISTANT_PROMPT.to_string(),
    }
}

/// Completion context: system prompt, retained history, then the new message.
pub fn build_context(
    summary: Option<&str>,
    history: &[ConversationTurn],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(assistant_prompt(summary)));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Summarizer context for a transcript of `role: content` lines.
pub fn summarization_context(transcript: &[ChatMessage]) -> Vec<ChatMessage> {
    let lines: Vec<String> = transcript
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect();
    vec![
        ChatMessage::system(SUMMARIZER_PROMPT),
        ChatMessage::user(format!("Summarize this conversation:\n\n{}", lines.join("\n"))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ChatRole;

    #[test]
    fn prompt_without_summary() {
        assert_eq!(assistant_prompt(None), "You are a helpful AI assistant.");
        assert_eq!(assistant_prompt(Some("  ")), "You are a helpful AI assistant.");
    }

    #[test]
    fn prompt_with_summary() {
        assert_eq!(
            assistant_prompt(Some("User asked about Rust.")),
            "You are a helpful AI assistant. Previous conversation summary: User asked about Rust."
        );
    }

    #[test]
    fn context_order() {
        let history = vec![
            ConversationTurn::user("one", 1),
            ConversationTurn::assistant("two", 2),
        ];
        let ctx = build_context(None, &history, "three");
        let roles: Vec<ChatRole> = ctx.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(ctx[3].content, "three");
    }

    #[test]
    fn summarization_transcript() {
        let ctx = summarization_context(&[
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        assert_eq!(ctx[0].content, SUMMARIZER_PROMPT);
        assert_eq!(ctx[1].content, "Summarize this conversation:\n\nuser: hi\nassistant: hello");
    }
}
