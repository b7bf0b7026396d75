use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::common::types::deserialize_id;
use crate::common::{ChatMessage, MessageStatus, RoomCommand, RoomEvent, RoomId, Session};
use crate::error::{ChatError, ChatResult};

use super::socketio::{Packet, SocketPacket};
use super::transport::{self, FrameWriter};

#[derive(Debug, Serialize)]
struct JoinGroup<'a> {
    room_id: &'a str,
    #[serde(rename = "clientOffset")]
    client_offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "deserialize_id")]
    message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate {
    #[serde(default, deserialize_with = "deserialize_id")]
    id: Option<String>,
    msg_status: MessageStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageSeen<'a> {
    message_id: &'a str,
    group: &'a str,
}

/// Maps a server event onto a UI event. Unknown or malformed events yield `None`.
pub fn decode_event(name: &str, args: &[Value]) -> Option<RoomEvent> {
    let payload = args.first().cloned().unwrap_or(Value::Null);
    let decoded = match name {
        "message" => serde_json::from_value::<ChatMessage>(payload).map(RoomEvent::MessageReceived),
        "typing" => serde_json::from_value::<TypingPayload>(payload)
            .map(|typing| RoomEvent::Typing {
                user_id: typing.user_id,
            }),
        "admin_control" => match serde_json::from_value::<AdminControl>(payload) {
            Ok(AdminControl {
                kind,
                message_id: Some(message_id),
                ..
            }) if kind == "delete" => return Some(RoomEvent::MessageDeleted { message_id }),
            Ok(control) => {
                log::debug!("Ignoring admin_control `{}`", control.kind);
                return None;
            }
            Err(err) => Err(err),
        },
        "messageStatusUpdate" => match serde_json::from_value::<StatusUpdate>(payload) {
            Ok(StatusUpdate {
                id: Some(message_id),
                msg_status,
            }) => Ok(RoomEvent::StatusUpdated {
                message_id,
                status: msg_status,
            }),
            Ok(_) => return None,
            Err(err) => Err(err),
        },
        "unauthorized_access" => Ok(RoomEvent::UnauthorizedAccess),
        other => {
            log::debug!("Ignoring unknown event `{other}`");
            return None;
        }
    };

    match decoded {
        Ok(event) => Some(event),
        Err(err) => {
            log::warn!("Dropping malformed `{name}` event: {err}");
            None
        }
    }
}

/// Một kết nối Socket.IO cho đúng một phòng chat.
pub struct RoomSocket {
    event_sender: mpsc::Sender<RoomEvent>,
    command_receiver: mpsc::Receiver<RoomCommand>,
    socket_url: String,
    room_id: RoomId,
    session: Session,
    client_offset: u64,
    connected: bool,
    /// Emits issued before the namespace connect was acknowledged.
    pending: Vec<Packet>,
}

impl RoomSocket {
    pub fn new(
        event_sender: mpsc::Sender<RoomEvent>,
        command_receiver: mpsc::Receiver<RoomCommand>,
        socket_url: String,
        room_id: RoomId,
        session: Session,
        client_offset: u64,
    ) -> Self {
        Self {
            event_sender,
            command_receiver,
            socket_url,
            room_id,
            session,
            client_offset,
            connected: false,
            pending: Vec::new(),
        }
    }

    /// Runs until the room is left, the server closes, or the transport fails.
    /// A `Disconnected` event is always emitted on the way out.
    pub async fn run(mut self) -> ChatResult<()> {
        let result = self.session_loop().await;
        let reason = result.as_ref().err().map(ToString::to_string);
        self.notify(RoomEvent::Disconnected(reason)).await;
        result
    }

    async fn session_loop(&mut self) -> ChatResult<()> {
        let (mut writer, mut reader) = transport::connect(&self.socket_url).await?;
        log::info!("Socket opened for room {}", self.room_id);

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(RoomCommand::Leave) | None => {
                            writer.send_text(Packet::disconnect().encode()).await?;
                            writer.close().await?;
                            log::info!("Left room {}", self.room_id);
                            return Ok(());
                        }
                        Some(command) => self.handle_command(command, &mut writer).await?,
                    }
                }
                frame = reader.next_text() => {
                    match frame {
                        Some(Ok(text)) => {
                            if !self.handle_frame(&text, &mut writer).await? {
                                return Ok(());
                            }
                        }
                        Some(Err(err)) => return Err(err),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: RoomCommand,
        writer: &mut FrameWriter,
    ) -> ChatResult<()> {
        let packet = match command {
            RoomCommand::SendMessage(message) => {
                Packet::event("message", serde_json::to_value(&message)?)
            }
            RoomCommand::Typing => Packet::event(
                "typing",
                serde_json::to_value(TypingPayload {
                    user_id: self.session.user_id.clone(),
                    group_id: Some(self.room_id.to_string()),
                })?,
            ),
            RoomCommand::DeleteMessage { message_id } => Packet::event(
                "admin_control",
                serde_json::to_value(AdminControl {
                    kind: "delete".to_string(),
                    message_id: Some(message_id),
                    user_id: Some(self.session.user_id.clone()),
                })?,
            ),
            RoomCommand::MessageSeen { message_id } => Packet::event(
                "messageSeen",
                serde_json::to_value(MessageSeen {
                    message_id: &message_id,
                    group: self.room_id.as_str(),
                })?,
            ),
            RoomCommand::Leave => return Ok(()),
        };
        if !self.connected {
            self.pending.push(packet);
            return Ok(());
        }
        writer.send_text(packet.encode()).await
    }

    /// Returns `false` once the session should end.
    async fn handle_frame(&mut self, text: &str, writer: &mut FrameWriter) -> ChatResult<bool> {
        let packet = match Packet::decode(text) {
            Ok(packet) => packet,
            Err(err) => {
                log::warn!("{err}");
                return Ok(true);
            }
        };

        match packet {
            Packet::Open(handshake) => {
                log::debug!(
                    "Engine.IO open sid={} ping_interval={}ms",
                    handshake.sid,
                    handshake.ping_interval
                );
                let auth = json!({
                    "token": self.session.token,
                    "clientOffset": self.client_offset,
                });
                writer.send_text(Packet::connect(auth).encode()).await?;
            }
            Packet::Ping(data) => writer.send_text(Packet::Pong(data).encode()).await?,
            Packet::Close => return Ok(false),
            Packet::Pong(_) | Packet::Noop => {}
            Packet::Message(SocketPacket::Connect { .. }) => {
                self.connected = true;
                self.notify(RoomEvent::Connected).await;
                let join = JoinGroup {
                    room_id: self.room_id.as_str(),
                    client_offset: self.client_offset,
                };
                writer
                    .send_text(Packet::event("join_group", serde_json::to_value(&join)?).encode())
                    .await?;
                for packet in std::mem::take(&mut self.pending) {
                    writer.send_text(packet.encode()).await?;
                }
            }
            Packet::Message(SocketPacket::ConnectError { data, .. }) => {
                let reason = data
                    .as_ref()
                    .and_then(|data| data.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string();
                return Err(ChatError::ConnectRefused(reason));
            }
            Packet::Message(SocketPacket::Disconnect { .. }) => {
                log::info!("Server closed the namespace for room {}", self.room_id);
                return Ok(false);
            }
            Packet::Message(SocketPacket::Event { name, args, .. }) => {
                if let Some(event) = decode_event(&name, &args) {
                    if let RoomEvent::MessageReceived(message) = &event {
                        if let Some(offset) = message.offset() {
                            self.client_offset = self.client_offset.max(offset);
                        }
                    }
                    self.notify(event).await;
                }
            }
            Packet::Message(SocketPacket::Ack { ack_id, .. }) => {
                log::debug!("Unexpected ack {ack_id}");
            }
        }
        Ok(true)
    }

    async fn notify(&self, event: RoomEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI about socket event: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    #[test]
    fn decodes_inbound_message() {
        let event = decode_event(
            "message",
            &[json!({"id": "5", "from": "bob", "message": "yo", "isFile": false, "group": "a_b", "msgStatus": "sent"})],
        );
        match event {
            Some(RoomEvent::MessageReceived(message)) => {
                assert_eq!(message.offset(), Some(5));
                assert_eq!(message.from, "bob");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn decodes_delete_control_only() {
        assert_eq!(
            decode_event("admin_control", &[json!({"type": "delete", "messageId": 8, "userId": "root"})]),
            Some(RoomEvent::MessageDeleted {
                message_id: "8".into()
            })
        );
        assert_eq!(
            decode_event("admin_control", &[json!({"type": "mute", "userId": "root"})]),
            None
        );
    }

    #[test]
    fn decodes_status_update() {
        assert_eq!(
            decode_event("messageStatusUpdate", &[json!({"id": "3", "msgStatus": "read"})]),
            Some(RoomEvent::StatusUpdated {
                message_id: "3".into(),
                status: MessageStatus::Read,
            })
        );
    }

    #[test]
    fn decodes_typing_and_unauthorized() {
        assert_eq!(
            decode_event("typing", &[json!({"userId": "carol", "groupId": "a_c"})]),
            Some(RoomEvent::Typing {
                user_id: "carol".into()
            })
        );
        assert_eq!(
            decode_event("unauthorized_access", &[]),
            Some(RoomEvent::UnauthorizedAccess)
        );
    }

    #[test]
    fn ignores_unknown_and_malformed_events() {
        assert_eq!(decode_event("presence", &[json!({})]), None);
        assert_eq!(decode_event("message", &[json!("not an object")]), None);
        assert_eq!(decode_event("typing", &[]), None);
    }

    async fn next_text(
        ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    ) -> String {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return text.to_string(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn joins_room_answers_pings_and_relays_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(
                r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#.into(),
            ))
            .await
            .unwrap();
            let connect = next_text(&mut ws).await;
            ws.send(Message::Text(r#"40{"sid":"n1"}"#.into()))
                .await
                .unwrap();
            let join = next_text(&mut ws).await;
            ws.send(Message::Text("2".into())).await.unwrap();
            ws.send(Message::Text(
                r#"42["message",{"id":"7","from":"bob","message":"hi","isFile":false,"group":"alice_bob","msgStatus":"sent"}]"#.into(),
            ))
            .await
            .unwrap();
            let pong = next_text(&mut ws).await;
            let typing = next_text(&mut ws).await;
            let leave = next_text(&mut ws).await;
            (connect, join, pong, typing, leave)
        });

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let socket = RoomSocket::new(
            event_tx,
            cmd_rx,
            format!("ws://{addr}/socket.io/?EIO=4&transport=websocket"),
            RoomId::from("alice_bob"),
            Session {
                token: "tok".into(),
                user_id: "alice".into(),
            },
            3,
        );
        let task = tokio::spawn(socket.run());

        assert_eq!(event_rx.recv().await, Some(RoomEvent::Connected));
        match event_rx.recv().await {
            Some(RoomEvent::MessageReceived(message)) => assert_eq!(message.offset(), Some(7)),
            other => panic!("unexpected event {other:?}"),
        }

        cmd_tx.send(RoomCommand::Typing).await.unwrap();
        cmd_tx.send(RoomCommand::Leave).await.unwrap();

        let (connect, join, pong, typing, leave) = server.await.unwrap();
        assert_eq!(
            Packet::decode(&connect).unwrap(),
            Packet::connect(json!({"token": "tok", "clientOffset": 3}))
        );
        assert_eq!(
            Packet::decode(&join).unwrap(),
            Packet::event("join_group", json!({"room_id": "alice_bob", "clientOffset": 3}))
        );
        assert_eq!(pong, "3");
        assert_eq!(
            Packet::decode(&typing).unwrap(),
            Packet::event("typing", json!({"userId": "alice", "groupId": "alice_bob"}))
        );
        assert_eq!(leave, "41");

        assert!(task.await.unwrap().is_ok());
        assert_eq!(event_rx.recv().await, Some(RoomEvent::Disconnected(None)));
    }

    #[tokio::test]
    async fn emits_before_connect_are_flushed_after_join() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"0{"sid":"s2","pingInterval":25000,"pingTimeout":20000}"#.into()))
                .await
                .unwrap();
            let _connect = next_text(&mut ws).await;
            ws.send(Message::Text("40".into())).await.unwrap();
            let first = next_text(&mut ws).await;
            let second = next_text(&mut ws).await;
            (first, second)
        });

        let (event_tx, _event_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let room = RoomId::from("alice_bob");
        cmd_tx
            .send(RoomCommand::SendMessage(ChatMessage::text("alice", &room, "early")))
            .await
            .unwrap();
        let socket = RoomSocket::new(
            event_tx,
            cmd_rx,
            format!("ws://{addr}/socket.io/?EIO=4&transport=websocket"),
            room,
            Session {
                token: "tok".into(),
                user_id: "alice".into(),
            },
            0,
        );
        let task = tokio::spawn(socket.run());

        let (first, second) = server.await.unwrap();
        assert!(first.starts_with(r#"42["join_group""#));
        match Packet::decode(&second).unwrap() {
            Packet::Message(SocketPacket::Event { name, args, .. }) => {
                assert_eq!(name, "message");
                assert_eq!(args[0]["message"], "early");
            }
            other => panic!("unexpected packet {other:?}"),
        }

        drop(cmd_tx);
        let _ = task.await.unwrap();
    }
}
