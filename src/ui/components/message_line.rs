use crate::common::{ChatMessage, MessageStatus};

use super::file_preview;

pub fn status_glyph(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Read => "✓✓",
        MessageStatus::Delivered => "✓",
        MessageStatus::Sent => "…",
    }
}

/// One message as a terminal line: `#id sender: body  status`.
pub fn render(message: &ChatMessage, user_id: &str) -> String {
    let sender = if message.from == user_id {
        "me"
    } else {
        message.from.as_str()
    };
    let body = if message.is_file {
        file_preview::render(&message.message)
    } else {
        message.message.clone()
    };
    let id = match message.offset() {
        Some(offset) => format!("#{offset} "),
        None => String::new(),
    };
    format!("{id}{sender}: {body}  {}", status_glyph(message.msg_status))
}
