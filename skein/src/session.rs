//! Per-conversation message log.
//!
//! A [`Session`] is an ordered, append-only (except [`Session::clear`])
//! sequence of [`Message`]s behind a readers-writer lock. Reads return a deep
//! copy, so callers can never observe or mutate the internal slice, not even
//! through a contained tool-call list.
//!
//! **Interaction**: owned by the kernel; one session per conversation.

use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::message::Message;

/// Ordered, concurrency-safe conversation log with a stable UUIDv7 id.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    messages: RwLock<Vec<Message>>,
}

impl Session {
    /// Creates an empty session with a fresh time-sortable id.
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            messages: RwLock::new(Vec::new()),
        }
    }

    /// The session id. Stable for the lifetime of the session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Appends one message.
    pub fn add_message(&self, message: Message) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Returns a deep copy of the message sequence.
    ///
    /// The copy is taken under the read lock; per-message tool-call lists are
    /// cloned along with everything else, so mutating the result never affects
    /// the session.
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages currently in the log.
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every message. The id is unchanged.
    pub fn clear(&self) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    /// **Scenario**: mutating the returned slice, including a contained
    /// tool-call list, never changes what a later read returns.
    #[test]
    fn messages_returns_defensive_deep_copy() {
        let session = Session::new();
        session.add_message(Message::assistant_tool_calls(
            "",
            vec![ToolCall::new("c1", "greet", "{}")],
        ));

        let mut copy = session.messages();
        copy[0].tool_calls[0].name = "mutated".to_string();
        copy.push(Message::user("injected"));

        let fresh = session.messages();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].tool_calls[0].name, "greet");
    }

    /// **Scenario**: ids are unique across sessions and stable across
    /// mutations.
    #[test]
    fn id_is_stable_and_unique() {
        let a = Session::new();
        let b = Session::new();
        assert_ne!(a.id(), b.id());

        let before = a.id();
        a.add_message(Message::user("hi"));
        a.clear();
        assert_eq!(a.id(), before);
    }

    /// **Scenario**: clear empties the log; subsequent appends start fresh.
    #[test]
    fn clear_then_append() {
        let session = Session::new();
        session.add_message(Message::user("one"));
        session.add_message(Message::user("two"));
        session.clear();
        assert!(session.is_empty());

        session.add_message(Message::user("three"));
        assert_eq!(session.messages()[0].content.as_text(), "three");
    }

    /// **Scenario**: concurrent appends from many threads all land; the final
    /// count is exact.
    #[test]
    fn concurrent_adds_are_all_recorded() {
        use std::sync::Arc;

        let session = Arc::new(Session::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let session = Arc::clone(&session);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    session.add_message(Message::user(format!("{t}-{i}")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(session.len(), 400);
    }
}
