//! Error types for the XSWD gateway.

use serde::{Deserialize, Serialize};

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,
}

/// Reasons an application descriptor is refused at admission.
///
/// The `Display` string of each variant is sent verbatim as the `message`
/// field of the authorization response, so these are part of the wire
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Invalid ID size")]
    InvalidIdSize,

    #[error("Invalid hexadecimal ID")]
    InvalidIdEncoding,

    #[error("Invalid name")]
    InvalidName,

    #[error("Invalid description")]
    InvalidDescription,

    #[error("Invalid URL compared to origin")]
    UrlOriginMismatch,

    #[error("Invalid URL")]
    UrlTooLong,

    #[error("Invalid application URL")]
    InvalidUrlScheme,

    #[error("Invalid signature size")]
    SignatureTooLong,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signer does not belong to DERO network")]
    ForeignSigner,

    #[error("Signature does not match ID")]
    SignatureIdMismatch,

    #[error("Application is requesting permissions without signature")]
    PermissionsWithoutSignature,

    #[error("App ID is already used")]
    DuplicateId,

    #[error("Invalid permissions")]
    TooManyPermissions,
}

/// Session transport errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,

    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("Failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by the wallet backend.
///
/// The gateway consumes the wallet through a trait and never inspects these
/// beyond their message, so implementations are free to pick the variant
/// that fits.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Daemon call failed: {0}")]
    Daemon(String),

    #[error("Wallet unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a bound method handler.
///
/// All handler failures are reported to the client as `INTERNAL_ERROR`
/// with this error's message embedded, so handlers only need to describe
/// what went wrong.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

/// Serializable wire shape `{code, message}` carried by error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
