//! Interface to the locally-held wallet and its daemon connection.
//!
//! The gateway never implements wallet primitives itself; signing,
//! signature verification, balances and the upstream daemon client all
//! live behind this trait.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::WalletError;
use crate::events::WalletEvent;

/// A verified signed message, as returned by the wallet's signature check.
#[derive(Debug, Clone)]
pub struct SignedMessage {
    /// Address of the recovered signer.
    pub signer: String,
    /// The signed plaintext.
    pub message: Vec<u8>,
    /// Whether the signer's address belongs to the wallet's own network.
    pub native_network: bool,
}

/// Wallet backend consumed by the gateway.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// The wallet's own address.
    fn address(&self) -> String;

    /// Current unlocked balance in atomic units.
    fn balance(&self) -> u64;

    /// Current synced topoheight.
    fn height(&self) -> u64;

    /// Sign arbitrary bytes, producing a self-contained signed message.
    fn sign_data(&self, data: &[u8]) -> Vec<u8>;

    /// Verify a signed message and recover its signer and plaintext.
    fn check_signature(&self, signed: &[u8]) -> Result<SignedMessage, WalletError>;

    /// Whether the upstream daemon is currently reachable.
    fn is_daemon_online(&self) -> bool;

    /// Endpoint of the connected daemon, if any.
    fn daemon_endpoint(&self) -> Option<String>;

    /// Relay a JSON-RPC call to the daemon. Params are opaque to the
    /// gateway and must be forwarded without schema validation.
    async fn daemon_call(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, WalletError>;

    /// Stream of wallet events to fan out to subscribed applications.
    fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent>;
}
