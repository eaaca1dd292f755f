//! Chat message type and server notices.

pub use relay_protocol::ChatMessage as Message;

/// Sender name used for messages synthesized by the server.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Build the notice announcing that `name` joined.
#[must_use]
pub fn join_notice(name: &str) -> Message {
    Message::new(SYSTEM_SENDER, format!("{name} joined the chat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_notice() {
        let notice = join_notice("Alice");
        assert_eq!(notice.from, SYSTEM_SENDER);
        assert_eq!(notice.text, "Alice joined the chat");
    }

    #[test]
    fn test_join_notice_empty_name() {
        assert_eq!(join_notice("").text, " joined the chat");
    }
}
