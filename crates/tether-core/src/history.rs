//! In-memory conversation log for one session.

use tether_providers::{Message, MessageContent, MessageRole};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

/// A user message with no tool_result blocks: a safe place to start a window.
fn is_plain_user(message: &Message) -> bool {
    message.role == MessageRole::User && !message.has_tool_results()
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append user text. Consecutive user text is merged so roles keep alternating
    /// (an aborted run can leave a user message without a reply).
    pub fn push_user_text(&mut self, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == MessageRole::User {
                if let MessageContent::Text(existing) = &mut last.content {
                    existing.push_str("\n\n");
                    existing.push_str(text);
                    return;
                }
            }
        }
        self.messages.push(Message::user(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Bound the history to `window` messages, dropping the oldest first.
    ///
    /// The kept range always starts at a plain user message, so a tool_use is
    /// never separated from the tool_result that answers it. When no such
    /// start exists inside the window, the first plain user message is kept
    /// as an anchor and the remainder starts at an assistant message. Returns
    /// the number of messages dropped.
    pub fn trim(&mut self, window: usize) -> usize {
        let window = window.max(2);
        let len = self.messages.len();
        if len <= window {
            return 0;
        }

        let earliest = len - window;
        if let Some(cut) = (earliest..len).find(|&i| is_plain_user(&self.messages[i])) {
            self.messages.drain(..cut);
            debug!("Trimmed {} messages from history", cut);
            return cut;
        }

        let Some(anchor) = self.messages.iter().position(is_plain_user) else {
            return 0;
        };
        let Some(start) = (earliest + 1..len)
            .find(|&i| i > anchor && self.messages[i].role == MessageRole::Assistant)
        else {
            return 0;
        };

        let before = self.messages.len();
        let anchor_message = self.messages[anchor].clone();
        self.messages.drain(..start);
        self.messages.insert(0, anchor_message);
        let dropped = before - self.messages.len();
        debug!("Trimmed {} messages from history (kept first user turn)", dropped);
        dropped
    }
}
