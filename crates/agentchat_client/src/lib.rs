//! Streaming chat client for the agent gateway (wire protocol, stream
//! assembly, markdown rendering, connection lifecycle).
//! Used by the `agentchat` terminal shell and embeddable behind any
//! [`ChatSink`] implementation.

pub mod config;
pub mod connection;
pub mod markdown;
pub mod messages;
pub mod status;
pub mod stream;
pub mod thinking;

pub use config::{Config, ConfigError};
pub use connection::{ChatClient, ChatSink, ClientError, Command, ConnectOptions, ConnectionState};
pub use markdown::render;
pub use messages::ServerEvent;
pub use status::{GatewayApi, ProviderInfo, StatusInfo};
pub use stream::{DisplayMessage, Role, StreamAssembler};
pub use thinking::{ThinkingIndicator, ThinkingState};
