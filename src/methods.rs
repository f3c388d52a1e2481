//! Bound method handlers and the gateway's built-in methods.
//!
//! Handlers are async closures keyed by exact method name. The gateway
//! registers its own protocol methods (`HasMethod`, `Subscribe`,
//! `Unsubscribe`, `SignData`, `CheckSignature`, `GetDaemon`) plus a thin
//! native surface over the wallet backend; embedders can bind more through
//! `XswdServer::set_custom_method`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::application::Application;
use crate::error::MethodError;
use crate::events::EventType;
use crate::wallet::WalletBackend;

/// Context passed to every bound handler invocation.
#[derive(Clone)]
pub struct MethodContext {
    pub wallet: Arc<dyn WalletBackend>,
    pub methods: Arc<MethodRegistry>,
    /// The admitted application issuing the request.
    pub app: Arc<Application>,
}

/// A bound method handler.
pub type MethodHandler =
    Arc<dyn Fn(MethodContext, Option<Value>) -> BoxFuture<'static, Result<Value, MethodError>> + Send + Sync>;

/// Map from method name to handler. Lookup is exact; alias normalization
/// never rewrites dispatch keys.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: RwLock<HashMap<String, MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .expect("methods lock poisoned")
            .contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<MethodHandler> {
        self.handlers
            .read()
            .expect("methods lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn insert(&self, name: impl Into<String>, handler: MethodHandler) {
        self.handlers
            .write()
            .expect("methods lock poisoned")
            .insert(name.into(), handler);
    }
}

/// Wrap an async closure into a [`MethodHandler`].
pub fn handler<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(MethodContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, MethodError>> + Send + 'static,
{
    Arc::new(
        move |ctx, params| -> BoxFuture<'static, Result<Value, MethodError>> {
            Box::pin(f(ctx, params))
        },
    )
}

#[derive(Debug, Deserialize)]
struct HasMethodParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    event: EventType,
}

#[derive(Debug, Serialize)]
struct SignatureResult {
    #[serde(with = "crate::application::base64_bytes")]
    signature: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct CheckSignatureResult {
    signer: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct GetDaemonResult {
    endpoint: String,
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, MethodError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| MethodError::InvalidParams(e.to_string()))
}

/// Byte-string params arrive as one base64-encoded JSON string.
fn parse_byte_params(params: Option<Value>) -> Result<Vec<u8>, MethodError> {
    match params {
        Some(Value::String(encoded)) => BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| MethodError::InvalidParams(e.to_string())),
        _ => Err(MethodError::InvalidParams(
            "expected a base64 byte string".to_string(),
        )),
    }
}

fn to_value<T: Serialize>(result: T) -> Result<Value, MethodError> {
    serde_json::to_value(result).map_err(|e| MethodError::Failed(e.to_string()))
}

/// Register the gateway's built-in protocol methods.
pub fn register_builtin_methods(methods: &MethodRegistry) {
    methods.insert(
        "HasMethod",
        handler(|ctx, params| async move {
            let p: HasMethodParams = parse_params(params)?;
            Ok(Value::Bool(ctx.methods.contains(&p.name)))
        }),
    );

    methods.insert(
        "Subscribe",
        handler(|ctx, params| async move {
            let p: SubscribeParams = parse_params(params)?;
            Ok(Value::Bool(ctx.app.subscribe(p.event)))
        }),
    );

    methods.insert(
        "Unsubscribe",
        handler(|ctx, params| async move {
            let p: SubscribeParams = parse_params(params)?;
            Ok(Value::Bool(ctx.app.unsubscribe(p.event)))
        }),
    );

    methods.insert(
        "SignData",
        handler(|ctx, params| async move {
            let data = parse_byte_params(params)?;
            to_value(SignatureResult {
                signature: ctx.wallet.sign_data(&data),
            })
        }),
    );

    methods.insert(
        "CheckSignature",
        handler(|ctx, params| async move {
            let signed = parse_byte_params(params)?;
            let verified = ctx.wallet.check_signature(&signed)?;
            to_value(CheckSignatureResult {
                signer: verified.signer,
                message: String::from_utf8_lossy(&verified.message).trim().to_string(),
            })
        }),
    );

    methods.insert(
        "GetDaemon",
        handler(|ctx, _params| async move {
            match ctx.wallet.daemon_endpoint() {
                Some(endpoint) => to_value(GetDaemonResult { endpoint }),
                None => Err(MethodError::Failed(
                    "Could not get daemon endpoint from wallet".to_string(),
                )),
            }
        }),
    );
}

/// Register the native wallet methods the gateway exposes out of the box.
pub fn register_wallet_methods(methods: &MethodRegistry) {
    methods.insert(
        "Echo",
        handler(|_ctx, params| async move {
            let words: Vec<String> = parse_params(params)?;
            Ok(Value::String(format!("WALLET {}", words.join(" "))))
        }),
    );

    methods.insert(
        "GetAddress",
        handler(|ctx, _params| async move { Ok(json!({ "address": ctx.wallet.address() })) }),
    );

    methods.insert(
        "GetBalance",
        handler(|ctx, _params| async move { Ok(json!({ "balance": ctx.wallet.balance() })) }),
    );

    methods.insert(
        "GetHeight",
        handler(|ctx, _params| async move { Ok(json!({ "height": ctx.wallet.height() })) }),
    );
}
