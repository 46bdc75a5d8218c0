//! agentchat: terminal shell for the gateway chat client.
//! Reads config, connects to the gateway WebSocket, then consumes stdin
//! line by line: plain lines are sent as user messages, `/`-prefixed lines
//! drive the connection (/provider, /reconnect, /clear, /status, /quit).

use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use agentchat_client::config::{self, Config};
use agentchat_client::connection::{
    ChatClient, ChatSink, Command, ConnectOptions, ConnectionState,
};
use agentchat_client::status::{self, GatewayApi};
use agentchat_client::stream::{DisplayMessage, Role};
use agentchat_client::thinking::ThinkingState;

/// Longest we wait for a turn to settle before taking the next stdin line.
const TURN_TIMEOUT: Duration = Duration::from_secs(120);

fn resolve_config_path() -> PathBuf {
    // 1. --config <path> flag
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    // 2. AGENTCHAT_CONFIG env var
    if let Ok(val) = std::env::var("AGENTCHAT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.agentchat/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or AGENTCHAT_CONFIG)");
        process::exit(1);
    })
}

/// Terminal implementation of the presentation boundary. Streams assistant
/// text as it grows, prefixes system/error lines, and signals the REPL when
/// a turn has settled.
struct TermSink {
    /// Bytes of each assistant entry already written to stdout.
    printed: HashMap<usize, usize>,
    /// A partial assistant line is on screen without a trailing newline.
    streaming_open: bool,
    thinking_active: bool,
    /// Set by the REPL before a send; cleared when the turn settles.
    awaiting: Arc<AtomicBool>,
    done: mpsc::UnboundedSender<()>,
    session_path: Option<PathBuf>,
}

impl TermSink {
    fn end_stream_line(&mut self) {
        if self.streaming_open {
            println!();
            self.streaming_open = false;
        }
    }

    fn signal_done(&mut self) {
        if self.awaiting.swap(false, Ordering::SeqCst) {
            let _ = self.done.send(());
        }
    }
}

impl ChatSink for TermSink {
    fn display(&mut self, index: usize, message: &DisplayMessage) {
        match message.role {
            // The user already typed it.
            Role::User => {}
            Role::Assistant => {
                let seen = self.printed.get(&index).copied().unwrap_or(0);
                if message.raw_text.len() > seen {
                    print!("{}", &message.raw_text[seen..]);
                    let _ = std::io::stdout().flush();
                    self.printed.insert(index, message.raw_text.len());
                    self.streaming_open = true;
                }
            }
            Role::System | Role::Error => {
                self.end_stream_line();
                let prefix = if message.role == Role::Error {
                    "error"
                } else {
                    "info"
                };
                println!("[{prefix}] {}", message.raw_text);
                // A system line before thinking ever started means the send
                // itself failed; the turn is over.
                if !self.thinking_active {
                    self.signal_done();
                }
            }
        }
    }

    fn thinking(&mut self, state: ThinkingState, _elapsed_secs: u64) {
        match state {
            ThinkingState::Thinking { .. } => self.thinking_active = true,
            ThinkingState::Idle => {
                self.thinking_active = false;
                self.end_stream_line();
                self.signal_done();
            }
        }
    }

    fn connection(&mut self, state: ConnectionState) {
        tracing::debug!("connection state: {state:?}");
    }

    fn session_adopted(&mut self, session_id: &str) {
        if let Some(path) = &self.session_path {
            config::store_session(path, session_id);
        }
    }

    fn cleared(&mut self) {
        self.end_stream_line();
        self.printed.clear();
        if let Some(path) = &self.session_path {
            config::clear_session(path);
        }
        println!("[info] conversation cleared");
    }
}

async fn print_status(api: &GatewayApi) {
    match api.status().await {
        Ok(info) => {
            let version = info.version.as_deref().unwrap_or("unknown version");
            println!(
                "[info] gateway {} ({}, {} sessions, channels: {})",
                info.status,
                version,
                info.sessions,
                if info.channels.is_empty() {
                    "none".to_string()
                } else {
                    info.channels.join(", ")
                }
            );
        }
        Err(err) => {
            tracing::debug!("status endpoint: {err}");
            println!("[info] gateway status unavailable");
        }
    }
}

async fn select_provider(
    api: Option<&GatewayApi>,
    commands: &mpsc::Sender<Command>,
    cfg: &mut Config,
    config_path: &std::path::Path,
    rest: &str,
) {
    let mut parts = rest.split_whitespace();
    let Some(provider) = parts.next() else {
        println!("usage: /provider <id> [model]");
        return;
    };
    let model = parts.next();
    let _ = commands
        .send(Command::SetRoute {
            provider: Some(provider.to_string()),
            model: model.map(str::to_string),
        })
        .await;
    if let Some(api) = api {
        if let Err(err) = api.activate_provider(provider).await {
            tracing::debug!("provider activation: {err}");
            println!("[info] provider endpoint unavailable");
        }
    }
    cfg.routing.provider = Some(provider.to_string());
    cfg.routing.model = model.map(str::to_string);
    if let Err(err) = config::save(config_path, cfg) {
        tracing::debug!("config not saved: {err}");
    }
    println!(
        "[info] routing via {provider}{}",
        model.map(|m| format!(" ({m})")).unwrap_or_default()
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config_path = resolve_config_path();
    let mut cfg = if config_path.exists() {
        match config::load(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!(
                    "Error: failed to load config from {}: {}",
                    config_path.display(),
                    e
                );
                process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let session_path = config_path
        .parent()
        .map(|dir| dir.join("session"))
        .or_else(config::default_session_path);
    let session_id = session_path.as_deref().and_then(config::load_session);

    let server_url = cfg.server_url().to_string();
    let options = ConnectOptions {
        url: server_url.clone(),
        token: cfg.server.token.clone(),
    };

    // Single-threaded cooperative scheduling: one event loop for the
    // connection task, the REPL, and every timer.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        let api = status::http_base_for(&server_url).ok().map(GatewayApi::new);
        if let Some(api) = &api {
            print_status(api).await;
            if cfg.server.token.is_none() && api.auth_required().await.unwrap_or(false) {
                println!("[info] gateway requires an auth token (set server.token)");
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<Command>(16);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let awaiting = Arc::new(AtomicBool::new(false));

        let sink = TermSink {
            printed: HashMap::new(),
            streaming_open: false,
            thinking_active: false,
            awaiting: awaiting.clone(),
            done: done_tx,
            session_path,
        };
        let mut client = ChatClient::new(options, session_id, sink);
        let client_task = tokio::spawn(async move {
            client.run(command_rx).await;
        });

        if cfg.routing.provider.is_some() || cfg.routing.model.is_some() {
            let _ = command_tx
                .send(Command::SetRoute {
                    provider: cfg.routing.provider.clone(),
                    model: cfg.routing.model.clone(),
                })
                .await;
        }

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    eprintln!("Error: stdin read failed: {}", err);
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command_line) = line.strip_prefix('/') {
                let (name, rest) = command_line
                    .split_once(char::is_whitespace)
                    .unwrap_or((command_line, ""));
                match name {
                    "quit" | "exit" => break,
                    "reconnect" => {
                        let _ = command_tx.send(Command::Reconnect).await;
                    }
                    "clear" => {
                        let _ = command_tx.send(Command::Clear).await;
                    }
                    "status" => match &api {
                        Some(api) => print_status(api).await,
                        None => println!("[info] gateway status unavailable"),
                    },
                    "provider" => {
                        select_provider(api.as_ref(), &command_tx, &mut cfg, &config_path, rest)
                            .await;
                    }
                    _ => println!("commands: /provider <id> [model], /reconnect, /clear, /status, /quit"),
                }
                continue;
            }

            // Drop any stale settle signal from a timed-out turn.
            while done_rx.try_recv().is_ok() {}
            awaiting.store(true, Ordering::SeqCst);
            if command_tx.send(Command::Send(line.to_string())).await.is_err() {
                break;
            }
            // Wait until the turn settles (final frame, error, or debounce).
            let _ = tokio::time::timeout(TURN_TIMEOUT, done_rx.recv()).await;
        }

        drop(command_tx);
        let _ = client_task.await;
    });
}
