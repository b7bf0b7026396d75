pub mod client;
pub mod socketio;
pub mod transport;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub use client::RoomSocket;

use crate::common::{RoomCommand, RoomEvent, RoomId, Session};

const COMMAND_BUFFER: usize = 100;
/// How long leaving waits for the disconnect and close frames to go out.
const LEAVE_GRACE: Duration = Duration::from_secs(2);

/// Command channel plus the task that owns the socket.
pub struct RoomConnection {
    commands: mpsc::Sender<RoomCommand>,
    task: JoinHandle<()>,
}

impl RoomConnection {
    pub fn new(commands: mpsc::Sender<RoomCommand>, task: JoinHandle<()>) -> Self {
        Self { commands, task }
    }

    pub fn send(&self, command: RoomCommand) {
        if let Err(err) = self.commands.try_send(command) {
            log::warn!("Failed to send command to socket: {err}");
        }
    }

    pub fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.commands.is_closed()
    }

    /// Asks the task to leave and waits until it has finished. Every event the
    /// old socket emits is queued before this returns.
    pub async fn close(mut self) {
        if !self.task.is_finished() {
            self.send(RoomCommand::Leave);
        }
        if timeout(LEAVE_GRACE, &mut self.task).await.is_err() {
            log::warn!("Socket task did not stop within {LEAVE_GRACE:?}; aborting it");
            self.task.abort();
            let _ = self.task.await;
        }
    }
}

/// Opens the real-time connection for a room view. The AI room never gets a
/// socket.
pub fn spawn_room_socket(
    api_url: &str,
    room_id: &RoomId,
    session: &Session,
    client_offset: u64,
    event_sender: mpsc::Sender<RoomEvent>,
) -> Option<RoomConnection> {
    if room_id.is_ai() {
        log::debug!("Room {room_id} is served by the completion API; no socket opened");
        return None;
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let socket = RoomSocket::new(
        event_sender,
        cmd_rx,
        transport::socket_url(api_url),
        room_id.clone(),
        session.clone(),
        client_offset,
    );
    let task = tokio::spawn(async move {
        if let Err(err) = socket.run().await {
            log::warn!("Room socket terminated: {err}");
        }
    });
    Some(RoomConnection::new(cmd_tx, task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ai_room_never_opens_a_socket() {
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let session = Session {
            token: "t".into(),
            user_id: "u".into(),
        };

        let connection =
            spawn_room_socket("http://127.0.0.1:9", &RoomId::ai(), &session, 0, event_tx);

        assert!(connection.is_none());
        // the only sender was consumed by the call, so the channel is closed and empty
        assert_eq!(event_rx.recv().await, None);
    }

    /// Loopback Socket.IO server on its own runtime; returns every frame it
    /// saw after the join, with `<close>` for the close frame.
    fn spawn_server(listener: std::net::TcpListener) -> std::thread::JoinHandle<Vec<String>> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::tungstenite::Message;

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.send(Message::Text(r#"0{"sid":"s1","pingInterval":25000}"#.into()))
                    .await
                    .unwrap();

                let mut frames = Vec::new();
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) if text.starts_with("40") => {
                            ws.send(Message::Text(r#"40{"sid":"n1"}"#.into()))
                                .await
                                .unwrap();
                        }
                        Message::Text(text) => frames.push(text.to_string()),
                        Message::Close(_) => {
                            frames.push("<close>".to_string());
                            break;
                        }
                        _ => {}
                    }
                }
                frames
            })
        })
    }

    #[test]
    fn close_sends_disconnect_and_close_frame_before_runtime_ends() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let api_url = format!("http://{}", listener.local_addr().unwrap());
        let server = spawn_server(listener);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (event_tx, mut event_rx) = mpsc::channel(16);
            let session = Session {
                token: "t".into(),
                user_id: "alice".into(),
            };
            let connection = spawn_room_socket(
                &api_url,
                &RoomId::from("alice_bob"),
                &session,
                0,
                event_tx,
            )
            .unwrap();
            assert_eq!(event_rx.recv().await, Some(RoomEvent::Connected));

            connection.close().await;
            assert!(matches!(
                event_rx.recv().await,
                Some(RoomEvent::Disconnected(_))
            ));
        });
        drop(runtime);

        let frames = server.join().unwrap();
        assert!(frames[0].starts_with(r#"42["join_group""#));
        assert_eq!(&frames[1..], ["41", "<close>"]);
    }
}
