use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::common::{ChatMessage, MessageStatus, RoomEvent, RoomId};

/// Chỉ báo "đang gõ" tự ẩn sau khoảng thời gian này.
pub const TYPING_DECAY: Duration = Duration::from_secs(2);

pub const AI_SENDER: &str = "AI";

#[derive(Debug, Clone)]
struct TypingIndicator {
    text: String,
    hide_at: Instant,
}

/// What an applied event changed, so the front-end can redraw just that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Appended(usize),
    Removed(usize),
    StatusChanged(usize),
    TypingShown,
    AiProgress,
    AiDone,
    Connection(bool),
    Unauthorized,
}

/// Trạng thái cục bộ của một phòng chat.
pub struct RoomState {
    pub room_id: RoomId,
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
    pub connected: bool,
    high_water: u64,
    typing: Option<TypingIndicator>,
}

impl RoomState {
    pub fn new(room_id: RoomId, user_id: String) -> Self {
        Self {
            room_id,
            user_id,
            messages: Vec::new(),
            connected: false,
            high_water: 0,
            typing: None,
        }
    }

    /// Largest offset seen so far; sent as `clientOffset` when (re)joining.
    pub fn high_water(&self) -> u64 {
        self.high_water
    }

    pub fn apply(&mut self, event: RoomEvent, now: Instant) -> Option<Change> {
        match event {
            RoomEvent::Connected => {
                self.connected = true;
                Some(Change::Connection(true))
            }
            RoomEvent::Disconnected(reason) => {
                if let Some(reason) = reason {
                    log::warn!("Room {} disconnected: {reason}", self.room_id);
                }
                self.connected = false;
                Some(Change::Connection(false))
            }
            RoomEvent::MessageReceived(message) => self.push_message(message).map(Change::Appended),
            RoomEvent::Typing { user_id } => self
                .show_typing(&user_id, now)
                .then_some(Change::TypingShown),
            RoomEvent::MessageDeleted { message_id } => match self.remove_message(&message_id) {
                0 => None,
                removed => Some(Change::Removed(removed)),
            },
            RoomEvent::StatusUpdated { message_id, status } => self
                .update_status(&message_id, status)
                .map(Change::StatusChanged),
            RoomEvent::UnauthorizedAccess => Some(Change::Unauthorized),
            RoomEvent::AiChunk { message_id, chunk } => self
                .append_ai_chunk(&message_id, &chunk)
                .map(|_| Change::AiProgress),
            RoomEvent::AiFinished { message_id } => self
                .position_of(&message_id)
                .map(|_| Change::AiDone),
        }
    }

    /// Appends a server message if its offset is past the high-water mark.
    /// Returns the index it landed at.
    pub fn push_message(&mut self, message: ChatMessage) -> Option<usize> {
        let Some(offset) = message.offset() else {
            log::warn!("Dropping message without a numeric id from {}", message.from);
            return None;
        };
        if offset <= self.high_water {
            log::debug!("Dropping duplicate message {offset} (high-water {})", self.high_water);
            return None;
        }
        self.high_water = offset;
        self.messages.push(message);
        Some(self.messages.len() - 1)
    }

    /// Shows the indicator for someone else's typing, restarting the decay window.
    pub fn show_typing(&mut self, user_id: &str, now: Instant) -> bool {
        if user_id == self.user_id {
            return false;
        }
        self.typing = Some(TypingIndicator {
            text: format!("{user_id} is typing ..."),
            hide_at: now + TYPING_DECAY,
        });
        true
    }

    pub fn typing_text(&self, now: Instant) -> Option<&str> {
        self.typing
            .as_ref()
            .filter(|typing| now < typing.hide_at)
            .map(|typing| typing.text.as_str())
    }

    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.as_ref().map(|typing| typing.hide_at)
    }

    /// Clears an indicator whose window has elapsed. Returns whether it was hidden.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        match &self.typing {
            Some(typing) if now >= typing.hide_at => {
                self.typing = None;
                true
            }
            _ => false,
        }
    }

    pub fn remove_message(&mut self, message_id: &str) -> usize {
        let before = self.messages.len();
        self.messages.retain(|message| !message.has_id(message_id));
        before - self.messages.len()
    }

    pub fn update_status(&mut self, message_id: &str, status: MessageStatus) -> Option<usize> {
        let index = self.position_of(message_id)?;
        self.messages[index].msg_status = status;
        Some(index)
    }

    /// Marks every unread message from other users as read and returns the
    /// ids that need a `messageSeen` receipt.
    pub fn mark_read(&mut self) -> Vec<String> {
        let mut seen = Vec::new();
        for message in &mut self.messages {
            if message.msg_status == MessageStatus::Read || message.from == self.user_id {
                continue;
            }
            message.msg_status = MessageStatus::Read;
            if let Some(id) = &message.id {
                seen.push(id.clone());
            }
        }
        seen
    }

    /// Adds the user's prompt and an empty AI placeholder; returns the placeholder id.
    pub fn begin_ai_exchange(&mut self, prompt: &str) -> String {
        let mut question = ChatMessage::text(&self.user_id, &self.room_id, prompt);
        question.id = Some(local_id());
        self.messages.push(question);

        let placeholder_id = local_id();
        let mut placeholder = ChatMessage::text(AI_SENDER, &self.room_id, "");
        placeholder.id = Some(placeholder_id.clone());
        placeholder.msg_status = MessageStatus::Read;
        self.messages.push(placeholder);
        placeholder_id
    }

    pub fn append_ai_chunk(&mut self, message_id: &str, chunk: &str) -> Option<usize> {
        let index = self.position_of(message_id)?;
        self.messages[index].message.push_str(chunk);
        Some(index)
    }

    fn position_of(&self, message_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.has_id(message_id))
    }
}

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> RoomState {
        RoomState::new(RoomId::from("alice_bob"), "alice".into())
    }

    fn message(id: &str, from: &str) -> ChatMessage {
        let mut message = ChatMessage::text(from, &RoomId::from("alice_bob"), "hello");
        message.id = Some(id.into());
        message
    }

    #[test]
    fn only_newer_offsets_are_appended() {
        let mut state = room();
        let now = Instant::now();
        let offsets = ["3", "1", "3", "5", "4", "6", "x"];
        let mut marks = Vec::new();
        for id in offsets {
            state.apply(RoomEvent::MessageReceived(message(id, "bob")), now);
            marks.push(state.high_water());
        }

        let kept: Vec<_> = state.messages.iter().filter_map(ChatMessage::offset).collect();
        assert_eq!(kept, vec![3, 5, 6]);
        assert!(marks.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(state.high_water(), 6);
    }

    #[test]
    fn delete_removes_only_matching_message() {
        let mut state = room();
        for id in ["1", "2", "3"] {
            state.push_message(message(id, "bob"));
        }

        let change = state.apply(
            RoomEvent::MessageDeleted {
                message_id: "2".into(),
            },
            Instant::now(),
        );

        assert_eq!(change, Some(Change::Removed(1)));
        let ids: Vec<_> = state.messages.iter().filter_map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(state.remove_message("42"), 0);
    }

    #[test]
    fn own_typing_never_shows_indicator() {
        let mut state = room();
        let now = Instant::now();
        let change = state.apply(
            RoomEvent::Typing {
                user_id: "alice".into(),
            },
            now,
        );
        assert_eq!(change, None);
        assert_eq!(state.typing_text(now), None);
    }

    #[test]
    fn typing_indicator_hides_two_seconds_after_last_event() {
        let mut state = room();
        let start = Instant::now();
        state.show_typing("bob", start);
        assert_eq!(state.typing_text(start), Some("bob is typing ..."));

        let second = start + Duration::from_millis(1500);
        state.show_typing("bob", second);

        let almost = second + TYPING_DECAY - Duration::from_millis(1);
        assert!(state.typing_text(almost).is_some());
        assert!(!state.expire_typing(almost));

        let deadline = second + TYPING_DECAY;
        assert_eq!(state.typing_deadline(), Some(deadline));
        assert_eq!(state.typing_text(deadline), None);
        assert!(state.expire_typing(deadline));
        assert_eq!(state.typing_deadline(), None);
    }

    #[test]
    fn status_update_touches_only_matching_message() {
        let mut state = room();
        state.push_message(message("1", "bob"));
        state.push_message(message("2", "bob"));

        let change = state.apply(
            RoomEvent::StatusUpdated {
                message_id: "2".into(),
                status: MessageStatus::Delivered,
            },
            Instant::now(),
        );

        assert_eq!(change, Some(Change::StatusChanged(1)));
        assert_eq!(state.messages[0].msg_status, MessageStatus::Sent);
        assert_eq!(state.messages[1].msg_status, MessageStatus::Delivered);
        assert_eq!(state.messages[1].message, "hello");
        assert_eq!(state.update_status("9", MessageStatus::Read), None);
    }

    #[test]
    fn mark_read_skips_own_and_already_read_messages() {
        let mut state = room();
        state.push_message(message("1", "bob"));
        state.push_message(message("2", "alice"));
        let mut read = message("3", "carol");
        read.msg_status = MessageStatus::Read;
        state.push_message(read);
        state.push_message(message("4", "carol"));

        assert_eq!(state.mark_read(), vec!["1", "4"]);
        assert_eq!(state.messages[1].msg_status, MessageStatus::Sent);
        assert!(state.mark_read().is_empty());
    }

    #[test]
    fn ai_chunks_fill_the_placeholder() {
        let mut state = RoomState::new(RoomId::ai(), "alice".into());
        let placeholder = state.begin_ai_exchange("what is rust?");
        let now = Instant::now();

        for chunk in ["A systems ", "language", "."] {
            state.apply(
                RoomEvent::AiChunk {
                    message_id: placeholder.clone(),
                    chunk: chunk.into(),
                },
                now,
            );
        }

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].from, "alice");
        assert_eq!(state.messages[0].msg_status, MessageStatus::Sent);
        assert_eq!(state.messages[1].from, AI_SENDER);
        assert_eq!(state.messages[1].message, "A systems language.");
        assert_eq!(state.messages[1].msg_status, MessageStatus::Read);
        assert_eq!(state.high_water(), 0);
    }

    #[test]
    fn unauthorized_and_connection_events_are_reported() {
        let mut state = room();
        let now = Instant::now();
        assert_eq!(state.apply(RoomEvent::Connected, now), Some(Change::Connection(true)));
        assert!(state.connected);
        assert_eq!(
            state.apply(RoomEvent::UnauthorizedAccess, now),
            Some(Change::Unauthorized)
        );
        assert_eq!(
            state.apply(RoomEvent::Disconnected(None), now),
            Some(Change::Connection(false))
        );
        assert!(!state.connected);
    }
}
