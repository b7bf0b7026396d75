use super::types::{ChatMessage, MessageStatus};

/// Sự kiện từ tầng mạng (socket hoặc AI) gửi lên UI.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Connected,
    Disconnected(Option<String>),
    MessageReceived(ChatMessage),
    Typing {
        user_id: String,
    },
    MessageDeleted {
        message_id: String,
    },
    StatusUpdated {
        message_id: String,
        status: MessageStatus,
    },
    UnauthorizedAccess,
    /// Một đoạn phản hồi AI cần nối vào tin nhắn giữ chỗ.
    AiChunk {
        message_id: String,
        chunk: String,
    },
    AiFinished {
        message_id: String,
    },
}
