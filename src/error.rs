use thiserror::Error;

/// Lỗi chung cho REST, socket, lưu trữ và AI.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    /// 403 from an authenticated endpoint; the cached session is no longer valid.
    #[error("access forbidden, please log in again")]
    Forbidden,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket connection refused: {0}")]
    ConnectRefused(String),

    #[error("malformed packet `{packet}`: {reason}")]
    Protocol { packet: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("completion failed: {0}")]
    Completion(String),
}

impl ChatError {
    pub(crate) fn protocol(packet: &str, reason: impl Into<String>) -> Self {
        ChatError::Protocol {
            packet: packet.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
