//! Connection lifecycle and event dispatch for the gateway WebSocket.
//!
//! [`ChatClient`] is the one context object: it owns the single transport,
//! the transcript assembler, the thinking indicator, the session id, and
//! every pending timer. Everything runs on one cooperative task; the `run`
//! loop resolves socket frames, user commands, and timer expiries into
//! [`Wake`] events consumed by a single dispatch path.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use url::Url;

use crate::messages::{InitMessage, ResumeMessage, ServerEvent, UserMessage};
use crate::stream::{DisplayMessage, Ingested, Role, StreamAssembler};
use crate::thinking::{ThinkingIndicator, ThinkingState, ThinkingTransition};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsError = tokio_tungstenite::tungstenite::Error;

/// Delay before the single scheduled reconnect attempt.
const RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Transport lifecycle state. Transitions are owned by [`ChatClient`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection settings for one client context.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8787/ws`.
    pub url: String,
    /// Auth token appended as a `token` query parameter when present.
    pub token: Option<String>,
}

/// Commands accepted by the client event loop.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a user message (closes any open streaming turn first).
    Send(String),
    /// Select the provider/model routing overrides attached to sends.
    SetRoute {
        provider: Option<String>,
        model: Option<String>,
    },
    /// Drop the transport and open a fresh one immediately.
    Reconnect,
    /// Wipe transcript and session, then start a fresh conversation.
    Clear,
}

/// Thin presentation boundary; the core never touches a UI directly.
pub trait ChatSink {
    /// The transcript entry at `index` was appended or updated.
    fn display(&mut self, index: usize, message: &DisplayMessage);
    /// The thinking indicator changed state or ticked.
    fn thinking(&mut self, state: ThinkingState, elapsed_secs: u64);
    /// Transport state transition.
    fn connection(&mut self, state: ConnectionState);
    /// The server issued (or switched) the session identifier.
    fn session_adopted(&mut self, session_id: &str);
    /// The transcript was cleared.
    fn cleared(&mut self);
}

/// Client transport error.
#[derive(Debug)]
pub struct ClientError(pub String);

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ClientError {}

impl From<WsError> for ClientError {
    fn from(e: WsError) -> Self {
        ClientError(e.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError(e.to_string())
    }
}

/// What woke the event loop.
enum Wake {
    Command(Option<Command>),
    Frame(Option<Result<Message, WsError>>),
    TimerFired,
}

/// The chat client context: transport, transcript, timers, session.
pub struct ChatClient<S: ChatSink> {
    options: ConnectOptions,
    sink: S,
    state: ConnectionState,
    socket: Option<WsStream>,
    session_id: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    assembler: StreamAssembler,
    thinking: ThinkingIndicator,
    reconnect_at: Option<Instant>,
}

impl<S: ChatSink> ChatClient<S> {
    pub fn new(options: ConnectOptions, session_id: Option<String>, sink: S) -> Self {
        Self {
            options,
            sink,
            state: ConnectionState::Disconnected,
            socket: None,
            session_id,
            provider: None,
            model: None,
            assembler: StreamAssembler::new(),
            thinking: ThinkingIndicator::new(),
            reconnect_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        self.assembler.messages()
    }

    /// Open the transport unless one is already connecting or connected.
    pub async fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        let endpoint = match self.endpoint_url() {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!("invalid server url: {err}");
                self.note_system(&format!("invalid server url: {err}"));
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        };
        match tokio_tungstenite::connect_async(endpoint.as_str()).await {
            Ok((socket, _)) => {
                debug!("connected to {}", self.options.url);
                self.socket = Some(socket);
                self.set_state(ConnectionState::Connected);
                self.greet().await;
            }
            Err(err) => {
                warn!("connect failed: {err}");
                self.note_system(&format!("connection failed: {err}"));
                self.socket = None;
                self.set_state(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    /// Drive the client until the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        self.connect().await;
        loop {
            match self.next_wake(&mut commands).await {
                Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.on_command(command).await,
                Wake::Frame(frame) => self.on_frame(frame).await,
                Wake::TimerFired => self.on_timer().await,
            }
        }
    }

    // ── Event sources ───────────────────────────────────────────────────

    async fn next_wake(&mut self, commands: &mut mpsc::Receiver<Command>) -> Wake {
        let deadline = self.next_deadline();
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };
        let socket = &mut self.socket;
        let frames = async {
            match socket {
                Some(stream) => stream.next().await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            command = commands.recv() => Wake::Command(command),
            frame = frames => Wake::Frame(frame),
            () = timer => Wake::TimerFired,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut deadline = self.thinking.next_deadline();
        if let Some(at) = self.reconnect_at {
            deadline = Some(match deadline {
                Some(current) => current.min(at),
                None => at,
            });
        }
        deadline
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Send(text) => self.send_user(&text).await,
            Command::SetRoute { provider, model } => {
                self.provider = provider;
                self.model = model;
            }
            Command::Reconnect => {
                // Clear the pending timer and drop the transport without
                // scheduling, so the old close path cannot double-connect.
                self.reconnect_at = None;
                self.socket = None;
                self.set_state(ConnectionState::Disconnected);
                if self.thinking.stop() {
                    self.notify_thinking();
                }
                self.connect().await;
            }
            Command::Clear => {
                self.reconnect_at = None;
                self.socket = None;
                self.set_state(ConnectionState::Disconnected);
                if self.thinking.stop() {
                    self.notify_thinking();
                }
                self.assembler.clear();
                self.session_id = None;
                self.sink.cleared();
                self.connect().await;
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Message, WsError>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.on_event_text(&text).await,
            Some(Ok(Message::Close(_))) | None => {
                self.on_connection_lost("server closed the connection");
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => self.on_connection_lost(&err.to_string()),
        }
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();
        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.reconnect_at = None;
                self.connect().await;
                return;
            }
        }
        match self.thinking.on_timer(now) {
            ThinkingTransition::None => {}
            ThinkingTransition::Tick | ThinkingTransition::WentIdle => self.notify_thinking(),
        }
    }

    async fn on_event_text(&mut self, text: &str) {
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(err) => {
                debug!("unparseable frame ({err})");
                self.note_system(text);
                return;
            }
        };
        if let Some(id) = event.session_id() {
            if self.session_id.as_deref() != Some(id) {
                self.session_id = Some(id.to_string());
                self.sink.session_adopted(id);
            }
        }
        match event {
            ServerEvent::Connected(ev) => {
                let note = ev.note.unwrap_or_else(|| "connected".to_string());
                self.note_system(&note);
            }
            ServerEvent::Resumed(ev) => {
                self.note_system(&format!("resumed session ({} messages)", ev.history_length));
            }
            ServerEvent::Message(ev) => {
                let ingested = self.assembler.ingest(Role::Assistant, &ev.content);
                self.notify_last();
                match ingested {
                    Ingested::Delta => {
                        if self.thinking.start(Instant::now()) {
                            self.notify_thinking();
                        }
                    }
                    Ingested::Final => {
                        if self.thinking.stop() {
                            self.notify_thinking();
                        }
                    }
                }
            }
            ServerEvent::Error(ev) => {
                self.assembler.push_error(&format!("[{}] {}", ev.code, ev.message));
                self.notify_last();
                if self.thinking.stop() {
                    self.notify_thinking();
                }
            }
            ServerEvent::Other { typ, raw } => {
                debug!("unrecognized event type {typ}");
                self.note_system(&raw.to_string());
            }
        }
    }

    // ── Actions ─────────────────────────────────────────────────────────

    async fn send_user(&mut self, text: &str) {
        if self.state != ConnectionState::Connected {
            self.note_system("not connected; message not sent");
            return;
        }
        self.assembler.push_user(text);
        self.notify_last();
        let message = UserMessage::new(text, self.provider.as_deref(), self.model.as_deref());
        match serde_json::to_string(&message) {
            Ok(json) => self.transmit(json).await,
            Err(err) => self.note_system(&format!("failed to encode message: {err}")),
        }
        // The transmit above may itself have detected a dead transport.
        if self.state == ConnectionState::Connected && self.thinking.start(Instant::now()) {
            self.notify_thinking();
        }
    }

    async fn greet(&mut self) {
        let payload = match &self.session_id {
            Some(id) => serde_json::to_string(&ResumeMessage::new(id)),
            None => serde_json::to_string(&InitMessage::new()),
        };
        match payload {
            Ok(json) => self.transmit(json).await,
            Err(err) => warn!("failed to encode greeting: {err}"),
        }
    }

    async fn transmit(&mut self, json: String) {
        let result = match self.socket.as_mut() {
            Some(socket) => socket.send(Message::Text(json)).await,
            None => return,
        };
        if let Err(err) = result {
            self.on_connection_lost(&format!("send failed: {err}"));
        }
    }

    fn on_connection_lost(&mut self, reason: &str) {
        self.socket = None;
        self.set_state(ConnectionState::Disconnected);
        if self.thinking.stop() {
            self.notify_thinking();
        }
        self.note_system(&format!(
            "disconnected: {reason} (reconnecting in {}s)",
            RECONNECT_DELAY.as_secs()
        ));
        self.schedule_reconnect();
    }

    /// Arm the single reconnect timer; re-arming replaces, never stacks.
    fn schedule_reconnect(&mut self) {
        self.reconnect_at = Some(Instant::now() + RECONNECT_DELAY);
    }

    fn endpoint_url(&self) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.options.url)?;
        if let Some(token) = &self.options.token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.to_string())
    }

    // ── Sink notifications ──────────────────────────────────────────────

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.sink.connection(state);
        }
    }

    fn note_system(&mut self, text: &str) {
        self.assembler.push_system(text);
        self.notify_last();
    }

    fn notify_last(&mut self) {
        if let Some(message) = self.assembler.last() {
            self.sink.display(self.assembler.len() - 1, message);
        }
    }

    fn notify_thinking(&mut self) {
        self.sink.thinking(self.thinking.state(), self.thinking.elapsed_secs());
    }
}
