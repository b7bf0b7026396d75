use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Trạng thái giao nhận của một tin nhắn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

/// Domain model đại diện một tin nhắn chat.
///
/// `id` is assigned by the server and doubles as the per-room offset. Locally
/// created messages (AI exchanges) carry a `local-` id that never parses as
/// an offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_id"
    )]
    pub id: Option<String>,
    pub from: String,
    pub message: String,
    #[serde(default)]
    pub is_file: bool,
    pub group: String,
    #[serde(default)]
    pub msg_status: MessageStatus,
}

impl ChatMessage {
    pub fn text(from: &str, room: &RoomId, body: &str) -> Self {
        Self {
            id: None,
            from: from.to_string(),
            message: body.to_string(),
            is_file: false,
            group: room.as_str().to_string(),
            msg_status: MessageStatus::Sent,
        }
    }

    pub fn file(from: &str, room: &RoomId, file_url: &str) -> Self {
        Self {
            id: None,
            from: from.to_string(),
            message: file_url.to_string(),
            is_file: true,
            group: room.as_str().to_string(),
            msg_status: MessageStatus::Read,
        }
    }

    /// Numeric offset of a server-delivered message.
    pub fn offset(&self) -> Option<u64> {
        self.id.as_deref()?.trim().parse().ok()
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id)
    }
}

/// Ids arrive as strings from some server builds and as numbers from others.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Định danh phòng chat: cặp user id đã sắp xếp, danh sách thành viên, hoặc "AI".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub const AI: &'static str = "AI";

    pub fn ai() -> Self {
        Self(Self::AI.to_string())
    }

    /// 1:1 room shared by two users, independent of who opens it.
    pub fn direct(user_a: &str, user_b: &str) -> Self {
        let mut pair = [user_a, user_b];
        pair.sort_unstable();
        Self(pair.join("_"))
    }

    pub fn group<S: AsRef<str>>(members: &[S]) -> Self {
        let mut members: Vec<&str> = members.iter().map(AsRef::as_ref).collect();
        members.sort_unstable();
        Self(members.join("_"))
    }

    pub fn is_ai(&self) -> bool {
        self.0 == Self::AI
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Group {
    pub fn room_id(&self) -> RoomId {
        RoomId::group(&self.members)
    }
}

/// Thông tin đăng nhập được lưu cục bộ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
}
