use super::types::ChatMessage;

/// Lệnh UI gửi xuống tầng mạng (một phòng chat).
#[derive(Debug, Clone)]
pub enum RoomCommand {
    SendMessage(ChatMessage),
    /// Người dùng đang gõ; server phát lại cho các thành viên khác.
    Typing,
    /// Yêu cầu xoá tin nhắn (admin_control / delete).
    DeleteMessage { message_id: String },
    /// Báo server rằng tin nhắn đã được đọc.
    MessageSeen { message_id: String },
    /// Rời phòng: gửi disconnect và đóng WebSocket.
    Leave,
}
