//! Pure unread-state derivation. No stored per-message flags: everything is
//! computed from the ordered message list and the viewer's (or the other
//! participant's) last-read instant.

use crate::chat::{ChatMessage, MessageView};

/// Unread count for `viewer_id` in one thread.
///
/// Last-message-direction heuristic: if the most recent message is the
/// viewer's own, the count is zero regardless of older unread messages.
/// Otherwise a missing read mark means every other-party message counts,
/// and a present mark counts only messages sent strictly after it.
pub fn unread_count(messages: &[ChatMessage], viewer_id: &str, read_at_ms: Option<i64>) -> u64 {
    let Some(last) = messages.last() else {
        return 0;
    };
    if last.sender_id == viewer_id {
        return 0;
    }
    messages
        .iter()
        .filter(|message| message.sender_id != viewer_id)
        .filter(|message| read_at_ms.is_none_or(|at| message.sent_at_ms > at))
        .count() as u64
}

/// Attaches display read flags for `viewer_id`.
///
/// The viewer's own messages are read once the other participant's mark is
/// at or past their send time. Messages from the other party are always
/// shown read: viewing marks the thread read before this runs.
pub fn message_views(
    messages: Vec<ChatMessage>,
    viewer_id: &str,
    other_read_at_ms: Option<i64>,
) -> Vec<MessageView> {
    messages
        .into_iter()
        .map(|message| {
            let read = if message.sender_id == viewer_id {
                other_read_at_ms.is_some_and(|at| message.sent_at_ms <= at)
            } else {
                true
            };
            MessageView { read, message }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, sender: &str, sent_at_ms: i64) -> ChatMessage {
        ChatMessage {
            message_id: id.to_string(),
            thread_id: "chat-1".to_string(),
            sender_id: sender.to_string(),
            body: "hello".to_string(),
            sent_at_ms,
        }
    }

    #[test]
    fn empty_thread_has_no_unread() {
        assert_eq!(unread_count(&[], "buyer", None), 0);
    }

    #[test]
    fn own_last_message_zeroes_the_count() {
        let messages = vec![
            message("m1", "seller", 100),
            message("m2", "seller", 200),
            message("m3", "buyer", 300),
        ];
        assert_eq!(unread_count(&messages, "buyer", None), 0);
    }

    #[test]
    fn never_read_counts_all_other_party_messages() {
        let messages = vec![
            message("m1", "seller", 100),
            message("m2", "buyer", 150),
            message("m3", "seller", 200),
        ];
        assert_eq!(unread_count(&messages, "buyer", None), 2);
    }

    #[test]
    fn only_messages_strictly_after_the_mark_count() {
        let messages = vec![
            message("m1", "seller", 100),
            message("m2", "seller", 200),
            message("m3", "seller", 300),
        ];
        assert_eq!(unread_count(&messages, "buyer", Some(200)), 1);
        assert_eq!(unread_count(&messages, "buyer", Some(300)), 0);
        assert_eq!(unread_count(&messages, "buyer", Some(50)), 3);
    }

    #[test]
    fn own_messages_read_once_other_mark_passes_them() {
        let messages = vec![message("m1", "buyer", 100), message("m2", "buyer", 300)];
        let views = message_views(messages, "buyer", Some(200));
        assert!(views[0].read);
        assert!(!views[1].read);
    }

    #[test]
    fn own_messages_unread_without_other_mark() {
        let views = message_views(vec![message("m1", "buyer", 100)], "buyer", None);
        assert!(!views[0].read);
    }

    #[test]
    fn other_party_messages_always_display_read() {
        let views = message_views(vec![message("m1", "seller", 100)], "buyer", None);
        assert!(views[0].read);
    }
}
