use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::ai::{self, CompletionClient};
use crate::api::ApiClient;
use crate::common::{ChatMessage, RoomCommand, RoomEvent, RoomId, Session};
use crate::config::AppConfig;
use crate::error::ChatResult;
use crate::network::{self, RoomConnection};

use super::components::message_line;
use super::state::{Change, RoomState};

const EVENT_BUFFER: usize = 100;

/// Một dòng người dùng nhập trong phòng chat.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Text(String),
    File(PathBuf),
    Delete(String),
    Seen,
    Disconnect,
    Reconnect,
    Quit,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let Some(command) = line.trim_start().strip_prefix('/') else {
        return Input::Text(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command.trim(), ""),
    };
    match (name, arg) {
        ("file", path) if !path.is_empty() => Input::File(PathBuf::from(path)),
        ("delete", id) if !id.is_empty() => Input::Delete(id.to_string()),
        ("seen", _) => Input::Seen,
        ("disconnect", _) => Input::Disconnect,
        ("reconnect", _) => Input::Reconnect,
        ("quit", _) | ("exit", _) => Input::Quit,
        _ => Input::Unknown(line.trim().to_string()),
    }
}

/// How the room view ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Left,
    Unauthorized,
}

pub struct ChatApp {
    state: RoomState,
    session: Session,
    api: ApiClient,
    api_url: String,
    completion: CompletionClient,
    connection: Option<RoomConnection>,
    event_sender: mpsc::Sender<RoomEvent>,
    event_receiver: mpsc::Receiver<RoomEvent>,
    /// Indicator text currently on screen.
    typing_shown: Option<String>,
    /// Placeholder of the AI reply still streaming, and whether its label is out.
    ai_reply: Option<String>,
    ai_label_printed: bool,
}

impl ChatApp {
    pub fn new(room_id: RoomId, session: Session, api: ApiClient, config: &AppConfig) -> Self {
        let (event_sender, event_receiver) = mpsc::channel(EVENT_BUFFER);
        Self {
            state: RoomState::new(room_id, session.user_id.clone()),
            session,
            api,
            api_url: config.api_url.clone(),
            completion: CompletionClient::from_config(config),
            connection: None,
            event_sender,
            event_receiver,
            typing_shown: None,
            ai_reply: None,
            ai_label_printed: false,
        }
    }

    pub async fn run(mut self) -> ChatResult<Exit> {
        println!(
            "Chatting in {} as {}. Commands: /file <path>, /delete <id>, /seen, /disconnect, /reconnect, /quit",
            self.state.room_id, self.state.user_id
        );
        self.connect();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let exit = loop {
            let typing_deadline = self.state.typing_deadline();
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_input(parse_input(&line)).await {
                                break Exit::Left;
                            }
                        }
                        None => break Exit::Left,
                    }
                }
                Some(event) = self.event_receiver.recv() => {
                    if let Some(exit) = self.handle_event(event) {
                        break exit;
                    }
                }
                _ = wait_for(typing_deadline) => {
                    if self.state.expire_typing(Instant::now()) {
                        self.typing_shown = None;
                    }
                }
            }
        };

        self.leave().await;
        Ok(exit)
    }

    fn connect(&mut self) {
        self.connection = network::spawn_room_socket(
            &self.api_url,
            &self.state.room_id,
            &self.session,
            self.state.high_water(),
            self.event_sender.clone(),
        );
    }

    /// Waits for the socket task to send its disconnect and close frames.
    async fn leave(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
    }

    fn emit(&self, command: RoomCommand) {
        match &self.connection {
            Some(connection) => {
                if !self.state.connected {
                    log::debug!("Socket still connecting; {command:?} will go out after join");
                }
                connection.send(command);
            }
            None => log::warn!("Not connected; dropping {command:?}"),
        }
    }

    /// Returns `false` when the user asked to leave.
    async fn handle_input(&mut self, input: Input) -> bool {
        match input {
            Input::Quit => return false,
            Input::Text(text) if self.state.room_id.is_ai() => {
                if !text.trim().is_empty() {
                    self.ask_ai(text);
                }
            }
            Input::Text(text) => {
                self.emit(RoomCommand::Typing);
                if !text.trim().is_empty() {
                    let message =
                        ChatMessage::text(&self.session.user_id, &self.state.room_id, &text);
                    self.emit(RoomCommand::SendMessage(message));
                }
            }
            Input::File(path) => self.send_file(path).await,
            Input::Delete(message_id) => self.emit(RoomCommand::DeleteMessage { message_id }),
            Input::Seen => {
                for message_id in self.state.mark_read() {
                    self.emit(RoomCommand::MessageSeen { message_id });
                }
            }
            Input::Disconnect => self.leave().await,
            Input::Reconnect => {
                if self.connection.as_ref().is_some_and(RoomConnection::is_live) {
                    println!("Already connected");
                } else {
                    // the old task has finished once this returns, so its
                    // Disconnected is queued ahead of the new Connected
                    self.leave().await;
                    self.connect();
                }
            }
            Input::Unknown(line) => println!("Unknown command: {line}"),
        }
        true
    }

    fn ask_ai(&mut self, prompt: String) {
        if self.ai_reply.is_some() {
            println!("(AI is still answering, wait for the reply)");
            return;
        }
        let placeholder = self.state.begin_ai_exchange(&prompt);
        self.ai_reply = Some(placeholder.clone());
        self.ai_label_printed = false;
        ai::spawn_reply(
            self.completion.clone(),
            prompt,
            placeholder,
            self.event_sender.clone(),
        );
    }

    async fn send_file(&mut self, path: PathBuf) {
        match self.api.upload_file(&self.session, &path).await {
            Ok(file_url) => {
                let message =
                    ChatMessage::file(&self.session.user_id, &self.state.room_id, &file_url);
                self.emit(RoomCommand::SendMessage(message));
            }
            Err(err) => log::error!("Upload of {} failed: {err}", path.display()),
        }
    }

    fn handle_event(&mut self, event: RoomEvent) -> Option<Exit> {
        let chunk = match &event {
            RoomEvent::AiChunk { chunk, .. } => Some(chunk.clone()),
            _ => None,
        };

        match self.state.apply(event, Instant::now())? {
            Change::Appended(index) | Change::StatusChanged(index) => {
                println!(
                    "{}",
                    message_line::render(&self.state.messages[index], &self.state.user_id)
                );
            }
            Change::Removed(count) => println!("({count} message(s) deleted)"),
            Change::TypingShown => {
                if let Some(text) = self.typing_update(Instant::now()) {
                    println!("  {text}");
                }
            }
            Change::AiProgress => {
                if let Some(chunk) = chunk {
                    print!("{}", self.ai_output(&chunk));
                    let _ = std::io::stdout().flush();
                }
            }
            Change::AiDone => {
                self.ai_reply = None;
                if self.ai_label_printed {
                    println!();
                } else {
                    println!("AI: (no reply)");
                }
            }
            Change::Connection(true) => log::info!("Connected to {}", self.state.room_id),
            Change::Connection(false) => println!("(disconnected, /reconnect to resume)"),
            Change::Unauthorized => {
                println!("Unauthorized access: you are not allowed in this room.");
                return Some(Exit::Unauthorized);
            }
        }
        None
    }

    /// Indicator text to print, only when it differs from what is on screen.
    fn typing_update(&mut self, now: Instant) -> Option<String> {
        let text = self.state.typing_text(now)?.to_string();
        if self.typing_shown.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.typing_shown = Some(text.clone());
        Some(text)
    }

    /// The `AI: ` label goes out with the first chunk of a reply.
    fn ai_output(&mut self, chunk: &str) -> String {
        if self.ai_label_printed {
            return chunk.to_string();
        }
        self.ai_label_printed = true;
        format!("AI: {chunk}")
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
