pub mod file_preview;
pub mod message_line;
