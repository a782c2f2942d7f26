pub mod telegram;

pub use telegram::{TelegramTransport, discover_chat_id};

use crate::errors::ChatError;

/// Chat message length ceiling, in code points, per the wire surface spec.
const CHAT_CEILING: usize = 4096;

/// Fixed marker inserted when a message is trimmed in the middle to fit the
/// ceiling, so both ends of the original content are preserved.
const TRIM_MARKER: &str = "\n… [trimmed] …\n";

/// A message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
}

/// Abstraction over a chat transport (send/receive), so the bridge core can
/// be exercised without a live Telegram connection.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), ChatError>;
    async fn recv(&self) -> Result<Option<InboundMessage>, ChatError>;
}

/// Trim `text` to fit the chat ceiling, replacing the middle with a marker
/// so both ends survive. Returns `None` if the result would be empty or
/// whitespace-only (such messages are dropped, not sent).
pub fn trim_for_chat(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CHAT_CEILING {
        return Some(text.to_string());
    }

    let marker_len = TRIM_MARKER.chars().count();
    let keep = CHAT_CEILING.saturating_sub(marker_len);
    let head_len = keep / 2;
    let tail_len = keep - head_len;

    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[chars.len() - tail_len..].iter().collect();

    Some(format!("{head}{TRIM_MARKER}{tail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_unchanged() {
        assert_eq!(trim_for_chat("hello").as_deref(), Some("hello"));
    }

    #[test]
    fn whitespace_only_message_is_dropped() {
        assert_eq!(trim_for_chat("   \n\t  "), None);
        assert_eq!(trim_for_chat(""), None);
    }

    #[test]
    fn oversize_message_is_mid_trimmed_with_marker_exactly_once() {
        let text = "a".repeat(5000);
        let trimmed = trim_for_chat(&text).unwrap();
        assert!(trimmed.chars().count() <= CHAT_CEILING);
        assert_eq!(trimmed.matches("[trimmed]").count(), 1);
        assert!(trimmed.starts_with('a'));
        assert!(trimmed.ends_with('a'));
    }

    #[test]
    fn exactly_at_ceiling_is_unchanged() {
        let text = "b".repeat(CHAT_CEILING);
        assert_eq!(trim_for_chat(&text).as_deref(), Some(text.as_str()));
    }
}
