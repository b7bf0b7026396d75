use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ChatResult;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Socket.IO endpoint for an HTTP(S) API base URL.
pub fn socket_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}{SOCKET_PATH}")
}

pub struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter {
    pub async fn send_text(&mut self, text: String) -> ChatResult<()> {
        log::debug!("socket >> {text}");
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> ChatResult<()> {
        self.sink.close().await?;
        Ok(())
    }
}

pub struct FrameReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader {
    /// Next text frame. `None` once the peer closed the connection.
    pub async fn next_text(&mut self) -> Option<ChatResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    log::debug!("socket << {text}");
                    return Some(Ok(text.to_string()));
                }
                Ok(Message::Close(frame)) => {
                    log::info!("Socket closed by server: {frame:?}");
                    return None;
                }
                // tungstenite answers websocket-level pings itself
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

pub async fn connect(url: &str) -> ChatResult<(FrameWriter, FrameReader)> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    let (sink, stream) = ws_stream.split();
    Ok((FrameWriter { sink }, FrameReader { stream }))
}
