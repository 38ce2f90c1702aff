use std::collections::HashMap;

use crate::models::{ChatMessage, NEW_CONVERSATION_TITLE};

const TITLE_CHARS: usize = 50;

/// Keep only the latest snapshot per stream token. Messages without a token
/// are kept as they are, in log order.
pub fn collapse_snapshots(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut latest: HashMap<&str, usize> = HashMap::new();
    for (position, message) in messages.iter().enumerate() {
        if let Some(token) = message.stream_token.as_deref() {
            latest.insert(token, position);
        }
    }

    messages
        .iter()
        .enumerate()
        .filter(|(position, message)| match message.stream_token.as_deref() {
            Some(token) => latest.get(token) == Some(position),
            None => true,
        })
        .map(|(_, message)| message.clone())
        .collect()
}

/// Title derived from the first user message of a fresh conversation.
pub fn title_from_message(content: &str) -> String {
    let head = content.chars().take(TITLE_CHARS).collect::<String>();
    format!("{head}...")
}

pub fn should_retitle(current_title: &str) -> bool {
    current_title == NEW_CONVERSATION_TITLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_to_latest_snapshot_per_token() {
        let messages = vec![
            ChatMessage::user("user-1", "flash sale"),
            ChatMessage::snapshot("stream-a", 0, "{", true),
            ChatMessage::snapshot("stream-a", 5, "{\n  \"c", true),
            ChatMessage::snapshot("explanation-b", 0, "📊", true),
            ChatMessage::snapshot("stream-a", 9, "{}", false),
        ];

        let collapsed = collapse_snapshots(&messages);
        let ids = collapsed.iter().map(|m| m.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["user-1", "explanation-b-0", "stream-a-9"]);
    }

    #[test]
    fn titles_truncate_to_fifty_chars() {
        let long = "x".repeat(80);
        assert_eq!(title_from_message(&long), format!("{}...", "x".repeat(50)));
        assert!(should_retitle("New Chat"));
        assert!(!should_retitle("Flash sale..."));
    }
}
