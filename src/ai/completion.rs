use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::common::RoomEvent;
use crate::config::AppConfig;
use crate::error::{ChatError, ChatResult};

/// Một dòng server-sent event từ API completion.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Chunk(String),
    Done,
    Skip,
}

/// Parses one line of an OpenAI-style streaming response.
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => SseLine::Chunk(content.to_string()),
            _ => SseLine::Skip,
        },
        Err(err) => {
            log::debug!("Skipping unparsable stream line: {err}");
            SseLine::Skip
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.ai_api_url.clone(),
            model: config.ai_model.clone(),
            api_key: config.ai_api_key.clone(),
        }
    }

    /// Streams the reply to `prompt`, forwarding every chunk as an
    /// `AiChunk` event for the placeholder `message_id`.
    pub async fn stream_reply(
        &self,
        prompt: &str,
        message_id: &str,
        events: &mpsc::Sender<RoomEvent>,
    ) -> ChatResult<()> {
        let mut request = self.http.post(&self.api_url).json(&json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": true,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Completion(format!("{status}: {body}")));
        }

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(bytes) = stream.next().await {
            pending.extend_from_slice(&bytes?);
            while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Chunk(chunk) => {
                        let event = RoomEvent::AiChunk {
                            message_id: message_id.to_string(),
                            chunk,
                        };
                        if events.send(event).await.is_err() {
                            // room closed; nobody is reading anymore
                            return Ok(());
                        }
                    }
                    SseLine::Done => return Ok(()),
                    SseLine::Skip => {}
                }
            }
        }
        Ok(())
    }
}

/// Runs one AI exchange in the background. Failures are logged and the
/// placeholder message is left as far as it got.
pub fn spawn_reply(
    client: CompletionClient,
    prompt: String,
    message_id: String,
    events: mpsc::Sender<RoomEvent>,
) {
    tokio::spawn(async move {
        if let Err(err) = client.stream_reply(&prompt, &message_id, &events).await {
            log::error!("AI completion failed: {err}");
        }
        let _ = events.send(RoomEvent::AiFinished { message_id }).await;
    });
}
