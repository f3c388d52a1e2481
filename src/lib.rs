//! XSWD — a wallet-side authorization gateway for dApps.
//!
//! The gateway brokers JSON-RPC traffic between untrusted applications and
//! a locally-held wallet over one websocket endpoint. A dApp connects,
//! presents a signed identity descriptor, waits for the user to accept,
//! and then issues requests that are gated per-method by a permission
//! table backed by user prompts. Daemon-prefixed methods are transparently
//! proxied to the upstream node, and wallet events fan out to subscribed
//! sessions as unsolicited notifications.
//!
//! The wallet itself (keys, signature verification, the daemon client) and
//! the UI rendering prompts stay outside: they plug in through
//! [`WalletBackend`] and [`PromptHandler`].

pub mod application;
pub mod config;
pub mod error;
pub mod events;
pub mod limiter;
pub mod methods;
pub mod permission;
pub mod prompt;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod session;
pub mod wallet;

pub use application::{Application, ApplicationData, AuthorizationResponse};
pub use config::{XswdConfig, DEFAULT_NO_STORE, XSWD_PORT};
pub use error::{AdmissionError, Error, MethodError, Result, RpcError, WalletError};
pub use events::{EventNotification, EventType, WalletEvent};
pub use permission::{Permission, DAEMON_PREFIX};
pub use prompt::PromptHandler;
pub use rpc::{RpcRequest, RpcResponse};
pub use server::XswdServer;
pub use wallet::{SignedMessage, WalletBackend};
