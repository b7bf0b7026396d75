//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Every WebSocket text frame carries one Engine.IO packet. The first
//! character is the Engine.IO type; `4` (message) frames wrap a Socket.IO
//! packet whose own type is the next character:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open
//! 2 / 3                           ping / pong
//! 40{"token":..}                  connect (client auth or server ack)
//! 41                              disconnect
//! 42["message",{..}]              event
//! 44{"message":..}                connect error
//! ```
//!
//! Binary attachments (`45`, `46`) are not used by the chat server and are
//! rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ChatError, ChatResult};

const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Noop,
    Message(SocketPacket),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl Packet {
    /// Client connect to the default namespace, carrying the auth payload.
    pub fn connect(auth: Value) -> Self {
        Packet::Message(SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: Some(auth),
        })
    }

    pub fn disconnect() -> Self {
        Packet::Message(SocketPacket::Disconnect {
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    pub fn event(name: &str, payload: Value) -> Self {
        Packet::Message(SocketPacket::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ack_id: None,
            name: name.to_string(),
            args: vec![payload],
        })
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!(
                "0{}",
                serde_json::json!({
                    "sid": handshake.sid,
                    "pingInterval": handshake.ping_interval,
                    "pingTimeout": handshake.ping_timeout,
                })
            ),
            Packet::Close => "1".to_string(),
            Packet::Ping(data) => format!("2{data}"),
            Packet::Pong(data) => format!("3{data}"),
            Packet::Noop => "6".to_string(),
            Packet::Message(packet) => format!("4{}", packet.encode()),
        }
    }

    pub fn decode(frame: &str) -> ChatResult<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ChatError::protocol(frame, "empty frame"))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest).map_err(|err| {
                ChatError::protocol(frame, format!("bad handshake: {err}"))
            })?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping(rest.to_string())),
            '3' => Ok(Packet::Pong(rest.to_string())),
            '4' => SocketPacket::decode(rest)
                .map(Packet::Message)
                .map_err(|reason| ChatError::protocol(frame, reason)),
            '6' => Ok(Packet::Noop),
            other => Err(ChatError::protocol(
                frame,
                format!("unsupported engine packet type `{other}`"),
            )),
        }
    }
}

impl SocketPacket {
    fn encode(&self) -> String {
        match self {
            SocketPacket::Connect { namespace, data } => {
                let mut out = format!("0{}", namespace_prefix(namespace));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            SocketPacket::Disconnect { namespace } => {
                format!("1{}", namespace_prefix(namespace))
            }
            SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!(
                    "2{}{}{}",
                    namespace_prefix(namespace),
                    ack_id.map(|id| id.to_string()).unwrap_or_default(),
                    Value::Array(items)
                )
            }
            SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            } => format!(
                "3{}{ack_id}{}",
                namespace_prefix(namespace),
                Value::Array(args.clone())
            ),
            SocketPacket::ConnectError { namespace, data } => {
                let mut out = format!("4{}", namespace_prefix(namespace));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
        }
    }

    fn decode(body: &str) -> Result<Self, String> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or("missing socket packet type")?;
        let (namespace, rest) = split_namespace(chars.as_str());

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let (ack, payload) = rest.split_at(digits);
        let ack_id = if ack.is_empty() {
            None
        } else {
            Some(ack.parse::<u64>().map_err(|err| err.to_string())?)
        };

        let data = if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(payload).map_err(|err| err.to_string())?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let Some(Value::Array(mut items)) = data else {
                    return Err("event payload must be a JSON array".into());
                };
                if items.is_empty() {
                    return Err("event without a name".into());
                }
                let Value::String(name) = items.remove(0) else {
                    return Err("event name must be a string".into());
                };
                Ok(SocketPacket::Event {
                    namespace,
                    ack_id,
                    name,
                    args: items,
                })
            }
            '3' => {
                let ack_id = ack_id.ok_or("ack without id")?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    _ => return Err("ack payload must be a JSON array".into()),
                };
                Ok(SocketPacket::Ack {
                    namespace,
                    ack_id,
                    args,
                })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data }),
            '5' | '6' => Err("binary packets are not supported".into()),
            other => Err(format!("unknown socket packet type `{other}`")),
        }
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{namespace},")
    }
}

fn split_namespace(rest: &str) -> (String, &str) {
    if !rest.starts_with('/') {
        return (DEFAULT_NAMESPACE.to_string(), rest);
    }
    match rest.find(',') {
        Some(comma) => (rest[..comma].to_string(), &rest[comma + 1..]),
        None => (rest.to_string(), ""),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_open_handshake() {
        let packet = Packet::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            Packet::Open(Handshake {
                sid: "lv_VI97HAXpY6yYWAAAC".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn decodes_ping_and_probe() {
        assert_eq!(Packet::decode("2").unwrap(), Packet::Ping(String::new()));
        assert_eq!(
            Packet::decode("2probe").unwrap(),
            Packet::Ping("probe".into())
        );
    }

    #[test]
    fn decodes_event_with_payload() {
        let packet = Packet::decode(r#"42["typing",{"userId":"bob","groupId":"a_b"}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                namespace: "/".into(),
                ack_id: None,
                name: "typing".into(),
                args: vec![json!({"userId": "bob", "groupId": "a_b"})],
            })
        );
    }

    #[test]
    fn decodes_namespaced_event_with_ack_id() {
        let packet = Packet::decode(r#"42/admin,13["ping"]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Message(SocketPacket::Event {
                namespace: "/admin".into(),
                ack_id: Some(13),
                name: "ping".into(),
                args: vec![],
            })
        );
    }

    #[test]
    fn decodes_connect_ack_and_error() {
        assert_eq!(
            Packet::decode(r#"40{"sid":"abc"}"#).unwrap(),
            Packet::Message(SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({"sid": "abc"})),
            })
        );
        assert_eq!(
            Packet::decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::Message(SocketPacket::ConnectError {
                namespace: "/".into(),
                data: Some(json!({"message": "Not authorized"})),
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(Packet::decode("").is_err());
        assert!(Packet::decode("9").is_err());
        assert!(Packet::decode("42{not json").is_err());
        assert!(Packet::decode(r#"42{"not":"an array"}"#).is_err());
        assert!(Packet::decode(r#"451-["upload",{"_placeholder":true,"num":0}]"#).is_err());
    }

    #[test]
    fn encodes_client_packets() {
        let connect = Packet::connect(json!({"token": "t", "clientOffset": 4})).encode();
        assert!(connect.starts_with("40{"));
        assert_eq!(
            Packet::decode(&connect).unwrap(),
            Packet::connect(json!({"token": "t", "clientOffset": 4}))
        );
        assert_eq!(
            Packet::event("messageSeen", json!({"messageId": "9"})).encode(),
            r#"42["messageSeen",{"messageId":"9"}]"#
        );
        assert_eq!(Packet::disconnect().encode(), "41");
        assert_eq!(Packet::Pong(String::new()).encode(), "3");
    }
}
