//! The XSWD server: websocket admission, request dispatch and event
//! fan-out.
//!
//! Each session gets its own reader task; a single dispatcher task drains
//! the request and registration channels serially, which is what makes
//! "at most one outstanding user prompt" hold across all applications.
//! Event fan-out runs on a separate pump fed by the wallet's broadcast
//! stream.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::application::{Application, ApplicationData, AuthorizationResponse};
use crate::config::XswdConfig;
use crate::error::{AdmissionError, RpcError, ServerError};
use crate::events::{EventNotification, EventType};
use crate::methods::{
    register_builtin_methods, register_wallet_methods, MethodContext, MethodHandler,
    MethodRegistry,
};
use crate::permission::{filter_requested, Permission, DAEMON_PREFIX};
use crate::prompt::PromptHandler;
use crate::registry::AppRegistry;
use crate::rpc::{self, RpcRequest, RpcResponse};
use crate::session::Session;
use crate::wallet::WalletBackend;

/// A parsed request queued for the dispatcher.
struct RequestMessage {
    app: Arc<Application>,
    session: Arc<Session>,
    request: RpcRequest,
}

/// A validated descriptor awaiting the user's admission decision.
struct RegisterMessage {
    app: Arc<Application>,
    session: Arc<Session>,
}

struct DispatcherChannels {
    requests: mpsc::Receiver<RequestMessage>,
    registers: mpsc::Receiver<RegisterMessage>,
}

/// The wallet-side authorization gateway.
///
/// Construct with [`XswdServer::new`] (default port, `force_ask`, default
/// `no_store` list) or [`XswdServer::with_config`], then call
/// [`start`](Self::start) to bind and serve.
pub struct XswdServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    config: XswdConfig,
    wallet: Arc<dyn WalletBackend>,
    prompt: Arc<dyn PromptHandler>,
    registry: AppRegistry,
    methods: Arc<MethodRegistry>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    request_tx: mpsc::Sender<RequestMessage>,
    register_tx: mpsc::Sender<RegisterMessage>,
    channels: Mutex<Option<DispatcherChannels>>,
}

impl XswdServer {
    /// Server on the default XSWD port with `force_ask` enabled and the
    /// default `no_store` methods.
    pub fn new(wallet: Arc<dyn WalletBackend>, prompt: Arc<dyn PromptHandler>) -> Self {
        Self::with_config(XswdConfig::default(), wallet, prompt)
    }

    pub fn with_config(
        config: XswdConfig,
        wallet: Arc<dyn WalletBackend>,
        prompt: Arc<dyn PromptHandler>,
    ) -> Self {
        let methods = Arc::new(MethodRegistry::new());
        register_builtin_methods(&methods);
        register_wallet_methods(&methods);

        let (request_tx, request_rx) = mpsc::channel(64);
        let (register_tx, register_rx) = mpsc::channel(16);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(ServerInner {
                config,
                wallet,
                prompt,
                registry: AppRegistry::new(),
                methods,
                running: AtomicBool::new(false),
                shutdown,
                request_tx,
                register_tx,
                channels: Mutex::new(Some(DispatcherChannels {
                    requests: request_rx,
                    registers: register_rx,
                })),
            }),
        }
    }

    /// Bind the websocket endpoint and spawn the server tasks. Returns the
    /// bound address (useful with port 0).
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let channels = self
            .inner
            .channels
            .lock()
            .expect("channels lock poisoned")
            .take()
            .ok_or(ServerError::AlreadyRunning)?;

        let port = self.inner.config.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| ServerError::BindFailed {
                port,
                reason: e.to_string(),
            })?;
        let bound = listener
            .local_addr()
            .map_err(|e| ServerError::BindFailed {
                port,
                reason: e.to_string(),
            })?;

        self.inner.running.store(true, Ordering::SeqCst);

        let router = Router::new()
            .route("/", get(|| async { "XSWD server" }))
            .route("/xswd", get(ws_upgrade_handler))
            .with_state(self.inner.clone());

        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.wait_for(|stopped| *stopped).await;
                })
                .await
            {
                warn!("XSWD server error: {e}");
            }
        });

        tokio::spawn(dispatcher_loop(self.inner.clone(), channels));
        tokio::spawn(event_pump(self.inner.clone()));

        info!(addr = %bound, "XSWD server listening");
        Ok(bound)
    }

    /// Stop the server: cancel the dispatcher, wake every outstanding
    /// prompt and close all sessions. Idempotent.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.inner.shutdown.send(true);
        self.inner.registry.shutdown_all().await;
        info!("XSWD server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &XswdConfig {
        &self.inner.config
    }

    /// Bind an additional method handler. Names are matched exactly at
    /// dispatch.
    pub fn set_custom_method(&self, name: impl Into<String>, handler: MethodHandler) {
        self.inner.methods.insert(name, handler);
    }

    pub fn has_application_id(&self, id: &str) -> bool {
        self.inner.registry.has_id(id)
    }

    /// Snapshot of all admitted applications.
    pub fn applications(&self) -> Vec<Arc<Application>> {
        self.inner
            .registry
            .snapshot()
            .into_iter()
            .map(|(_, app)| app)
            .collect()
    }

    /// Remove an application by id, waking any prompt it owns and closing
    /// its session.
    pub async fn remove_application(&self, id: &str) -> bool {
        self.inner.registry.remove_by_id(id).await
    }

    /// Whether any live application subscribed to `event`.
    pub fn is_event_tracked(&self, event: EventType) -> bool {
        self.inner.is_event_tracked(event)
    }

    /// Deliver `event` to every subscribed application.
    pub async fn broadcast_event(&self, event: EventType, value: Value) {
        self.inner.broadcast_event(event, value).await;
    }

    /// Whether `method` may cache an `AlwaysAllow` decision.
    pub fn can_store_permission(&self, method: &str) -> bool {
        self.inner.can_store_permission(method)
    }
}

impl ServerInner {
    fn can_store_permission(&self, method: &str) -> bool {
        !self.no_store_contains(method)
    }

    fn no_store_contains(&self, method: &str) -> bool {
        self.config.no_store.iter().any(|m| m == method)
    }

    fn is_event_tracked(&self, event: EventType) -> bool {
        self.registry
            .snapshot()
            .iter()
            .any(|(_, app)| app.is_subscribed(event))
    }

    async fn broadcast_event(&self, event: EventType, value: Value) {
        let notification = serde_json::to_value(EventNotification {
            event,
            value,
        })
        .unwrap_or(Value::Null);

        for (session, app) in self.registry.snapshot() {
            if app.is_subscribed(event) {
                let frame = RpcResponse::with_result(None, notification.clone());
                if let Err(e) = session.send(&frame).await {
                    debug!(app = app.name(), "Error while broadcasting event: {e}");
                }
            }
        }
    }

    /// Validate a decoded descriptor against the transport origin,
    /// back-filling the url from the Origin header when absent. The
    /// rejection reason doubles as the wire message.
    fn sanity_check(
        &self,
        app: &mut ApplicationData,
        origin: Option<&str>,
    ) -> Result<(), AdmissionError> {
        let id = app.id.trim();
        if id.len() != 64 {
            return Err(AdmissionError::InvalidIdSize);
        }
        if hex::decode(id).is_err() || id.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(AdmissionError::InvalidIdEncoding);
        }
        app.id = id.to_string();

        if app.name.trim().is_empty() || app.name.len() > 255 || !app.name.is_ascii() {
            return Err(AdmissionError::InvalidName);
        }

        if app.description.trim().is_empty()
            || app.description.len() > 255
            || !app.description.is_ascii()
        {
            return Err(AdmissionError::InvalidDescription);
        }

        let origin = origin.unwrap_or_default();
        if app.url.is_empty() && !origin.is_empty() {
            debug!("No URL passed, using the Origin header");
            app.url = origin.to_string();
        }

        // The advertised url must match what the browser says the page is.
        if !origin.is_empty() && app.url != origin {
            return Err(AdmissionError::UrlOriginMismatch);
        }

        if app.url.len() > 255 {
            return Err(AdmissionError::UrlTooLong);
        }

        if !(app.url.starts_with("http://") || app.url.starts_with("https://")) {
            return Err(AdmissionError::InvalidUrlScheme);
        }

        if !app.signature.is_empty() {
            if app.signature.len() > 512 {
                return Err(AdmissionError::SignatureTooLong);
            }

            let verified = self
                .wallet
                .check_signature(&app.signature)
                .map_err(|_| AdmissionError::InvalidSignature)?;

            if !verified.native_network {
                return Err(AdmissionError::ForeignSigner);
            }

            let message = String::from_utf8_lossy(&verified.message);
            if message.trim() != app.id {
                return Err(AdmissionError::SignatureIdMismatch);
            }
            debug!(id = %app.id, "Signature matches ID");
        } else if !app.permissions.is_empty() {
            return Err(AdmissionError::PermissionsWithoutSignature);
        }

        if self.registry.has_id(&app.id) {
            return Err(AdmissionError::DuplicateId);
        }

        if app.permissions.len() > 255 {
            return Err(AdmissionError::TooManyPermissions);
        }

        Ok(())
    }

    /// Normalize the permissions a descriptor requested. With `force_ask`
    /// everything is discarded and each method will prompt.
    fn filter_permissions(&self, app: &mut ApplicationData) {
        if self.config.force_ask {
            info!("All wallet requests will ask for your permission");
            app.permissions = HashMap::new();
            return;
        }

        let filtered = filter_requested(
            &app.permissions,
            |method| self.methods.contains(method),
            |method| self.can_store_permission(method),
        );
        if filtered.is_empty() {
            info!("All wallet requests will ask for your permission");
        }
        app.permissions = filtered;
    }
}

async fn ws_upgrade_handler(
    State(inner): State<Arc<ServerInner>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Any origin may attempt the upgrade; the Origin header is validated
    // against the descriptor url during admission instead.
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    ws.on_upgrade(move |socket| handle_socket(inner, socket, origin))
}

/// Drive one websocket session from upgrade to teardown.
async fn handle_socket(inner: Arc<ServerInner>, socket: WebSocket, origin: Option<String>) {
    let session = Arc::new(Session::new(socket));
    debug!(session = %session.id(), "New websocket session");

    // The first frame of the session must be its application descriptor.
    let frame = match session.read().await {
        Ok(Some(frame)) => frame,
        _ => {
            session.close().await;
            return;
        }
    };

    let mut data: ApplicationData = match serde_json::from_slice(&frame) {
        Ok(data) => data,
        Err(e) => {
            debug!("Error while reading app data: {e}");
            let _ = session
                .send(&AuthorizationResponse {
                    message: "Invalid app data format".to_string(),
                    accepted: false,
                })
                .await;
            session.close().await;
            return;
        }
    };

    if inner.registry.has_id(&data.id) {
        info!(id = %data.id, name = %data.name, "App ID is already used");
        let _ = session
            .send(&AuthorizationResponse {
                message: AdmissionError::DuplicateId.to_string(),
                accepted: false,
            })
            .await;
        session.close().await;
        return;
    }

    if let Err(reason) = inner.sanity_check(&mut data, origin.as_deref()) {
        info!(id = %data.id, name = %data.name, %reason, "Rejecting application");
        let _ = session
            .send(&AuthorizationResponse {
                message: reason.to_string(),
                accepted: false,
            })
            .await;
        session.close().await;
        return;
    }

    inner.filter_permissions(&mut data);
    info!(
        "Application {} ({}) is requesting access to your wallet",
        data.name, data.url
    );

    let app = Arc::new(Application::new(data));
    let registration = RegisterMessage {
        app: app.clone(),
        session: session.clone(),
    };
    if inner.register_tx.send(registration).await.is_err() {
        session.close().await;
        return;
    }

    read_session_messages(&inner, session, app).await;
}

/// Block until the session closes, feeding its frames to the dispatcher.
async fn read_session_messages(
    inner: &Arc<ServerInner>,
    session: Arc<Session>,
    app: Arc<Application>,
) {
    loop {
        let frame = match session.read().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!("Error while reading message from session: {e}");
                break;
            }
        };

        // One token per inbound frame; an empty bucket is fatal.
        if !app.limiter().allow() {
            warn!(name = app.name(), "Rate limit exceeded, closing connection");
            let response = RpcResponse::with_error(
                None,
                RpcError::new(
                    rpc::RATE_LIMIT_EXCEEDED,
                    "Requests have exceeded rate limit, closing connection",
                ),
            );
            let _ = session.send(&response).await;
            break;
        }

        // The app tried to speak while not (or no longer) authorized.
        if !inner.registry.has_id(app.id()) {
            info!(
                name = app.name(),
                "Unauthorized application sent a request, closing connection"
            );
            break;
        }

        let request = match rpc::parse_frame(&frame) {
            Ok(request) => request,
            Err(e) => {
                debug!("Error while parsing request: {e}");
                let response = RpcResponse::with_error(None, e.to_rpc_error());
                if session.send(&response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let message = RequestMessage {
            app: app.clone(),
            session: session.clone(),
            request,
        };
        if inner.request_tx.send(message).await.is_err() {
            break;
        }
    }

    cleanup_session(inner, &session, &app).await;
}

/// Teardown path shared by client close, read errors and rate-limit kills:
/// wake a blocked prompt, close the socket, drop the registry record.
async fn cleanup_session(inner: &ServerInner, session: &Arc<Session>, app: &Arc<Application>) {
    if app.is_requesting() {
        info!(name = app.name(), "Closing request prompt");
        app.signal_close();
    }

    session.close().await;

    if inner.registry.remove_session(session.id()).is_some() {
        info!(
            id = app.id(),
            name = app.name(),
            url = app.url(),
            "Application deleted"
        );
    }
}

/// The single-flight dispatch loop. Requests and admissions are executed
/// to completion one at a time, which serializes every user prompt.
async fn dispatcher_loop(inner: Arc<ServerInner>, mut channels: DispatcherChannels) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            Some(message) = channels.requests.recv() => {
                if let Some(response) = handle_message(&inner, &message.app, &message.request).await {
                    if let Err(e) = message.session.send(&response).await {
                        debug!(app = message.app.name(), "Error while writing response: {e}");
                    }
                }
            }
            Some(message) = channels.registers.recv() => {
                admit_application(&inner, message).await;
            }
            _ = shutdown.changed() => {}
        }
    }
}

/// Ask the user to accept a connecting application and, on success,
/// publish the record in the registry.
async fn admit_application(inner: &Arc<ServerInner>, message: RegisterMessage) {
    let RegisterMessage { app, session } = message;

    app.set_requesting(true);
    let mut shutdown = inner.shutdown.subscribe();
    let decision = tokio::select! {
        accepted = inner.prompt.authorize_application(&app) => Some(accepted),
        _ = app.closed() => None,
        _ = shutdown.wait_for(|stopped| *stopped) => None,
    };
    app.set_requesting(false);

    let accepted = match decision {
        Some(accepted) => accepted,
        // The session disconnected or the server stopped while the prompt
        // was outstanding; drop the record silently.
        None => {
            session.close().await;
            return;
        }
    };

    if !accepted {
        info!(id = app.id(), name = app.name(), url = app.url(), "User has rejected connection request");
        let _ = session
            .send(&AuthorizationResponse {
                message: "User has rejected connection request".to_string(),
                accepted: false,
            })
            .await;
        session.close().await;
        return;
    }

    // The user may answer a prompt that outlived the server.
    if !inner.running.load(Ordering::SeqCst) {
        info!(id = app.id(), name = app.name(), "XSWD is offline");
        session.close().await;
        return;
    }

    // Two sessions can race past the socket-side duplicate check; the
    // registry insert is the authoritative one.
    if inner.registry.insert(session.clone(), app.clone()).is_err() {
        info!(id = app.id(), "App ID is already used");
        let _ = session
            .send(&AuthorizationResponse {
                message: AdmissionError::DuplicateId.to_string(),
                accepted: false,
            })
            .await;
        session.close().await;
        return;
    }

    info!(
        id = app.id(),
        name = app.name(),
        url = app.url(),
        "User has authorized the application"
    );
    let _ = session
        .send(&AuthorizationResponse {
            message: "User has authorized the application".to_string(),
            accepted: true,
        })
        .await;
}

/// Serve one request: daemon proxy, bound handler behind the permission
/// engine, or a not-found error. Returns `None` when no response should be
/// written (the application vanished).
async fn handle_message(
    inner: &Arc<ServerInner>,
    app: &Arc<Application>,
    request: &RpcRequest,
) -> Option<RpcResponse> {
    let method = request.method.as_str();

    let Some(handler) = inner.methods.get(method) else {
        // Only methods under the daemon prefix are proxied upstream.
        if method.starts_with(DAEMON_PREFIX) {
            return Some(proxy_daemon_request(inner, request).await);
        }

        info!(method, "RPC method not found");
        return Some(RpcResponse::with_error(
            Some(request),
            RpcError::new(rpc::METHOD_NOT_FOUND, format!("method {method:?} not found")),
        ));
    };

    // The application may have disconnected while this request sat in the
    // queue; don't prompt for a dead session.
    if !inner.registry.has_id(app.id()) {
        return None;
    }

    app.set_requesting(true);
    let permission = request_permission(inner, app, request).await;
    app.set_requesting(false);

    if permission.is_positive() {
        let ctx = MethodContext {
            wallet: inner.wallet.clone(),
            methods: inner.methods.clone(),
            app: app.clone(),
        };
        match handler(ctx, request.params.clone()).await {
            Ok(result) => Some(RpcResponse::with_result(Some(request), result)),
            Err(e) => Some(RpcResponse::with_error(
                Some(request),
                RpcError::new(
                    rpc::INTERNAL_ERROR,
                    format!("Error while handling request method {method:?}: {e}"),
                ),
            )),
        }
    } else {
        let code = if permission == Permission::AlwaysDeny {
            rpc::PERMISSION_ALWAYS_DENIED
        } else {
            rpc::PERMISSION_DENIED
        };
        info!(name = app.name(), method, "Permission not granted for method");
        Some(RpcResponse::with_error(
            Some(request),
            RpcError::new(code, format!("Permission not granted for method {method:?}")),
        ))
    }
}

/// Relay a daemon-prefixed request upstream, mirroring the original id.
/// Params are opaque; the gateway never validates daemon schemas.
async fn proxy_daemon_request(inner: &ServerInner, request: &RpcRequest) -> RpcResponse {
    if !inner.wallet.is_daemon_online() {
        let endpoint = inner.wallet.daemon_endpoint().unwrap_or_default();
        debug!(%endpoint, "Daemon is offline");
        return RpcResponse::with_error(
            Some(request),
            RpcError::new(rpc::CANCELLED, format!("daemon {endpoint} is offline")),
        );
    }

    debug!(method = %request.method, "Relaying request to daemon");
    match inner
        .wallet
        .daemon_call(&request.method, request.params.clone())
        .await
    {
        Ok(result) => RpcResponse::with_result(Some(request), result),
        Err(e) => RpcResponse::with_error(
            Some(request),
            RpcError::new(rpc::INVALID_REQUEST, format!("Error on daemon call: {e}")),
        ),
    }
}

/// Resolve the permission for one request, prompting the user on a miss
/// and persisting sticky answers.
async fn request_permission(
    inner: &Arc<ServerInner>,
    app: &Arc<Application>,
    request: &RpcRequest,
) -> Permission {
    let method = request.method.as_str();

    if let Some(stored) = app.permission_for(method) {
        if stored != Permission::Ask {
            debug!(method, permission = %stored, "Permission already decided for method");
            return stored;
        }
    }

    let mut shutdown = inner.shutdown.subscribe();
    let decision = tokio::select! {
        decision = inner.prompt.request_permission(app, request) => decision,
        // Session death or shutdown abandons the prompt as a one-shot deny.
        _ = app.closed() => Permission::Deny,
        _ = shutdown.wait_for(|stopped| *stopped) => Permission::Deny,
    };

    if decision == Permission::AlwaysDeny
        || (decision == Permission::AlwaysAllow && inner.can_store_permission(method))
    {
        app.store_permission(method, decision);
    }

    if decision.is_positive() {
        info!(method, permission = %decision, "Permission granted");
    } else {
        info!(method, permission = %decision, "Permission rejected");
    }

    decision
}

/// Pump wallet events into subscribed sessions.
async fn event_pump(inner: Arc<ServerInner>) {
    let mut events = inner.wallet.subscribe_events();
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            result = events.recv() => match result {
                Ok(event) => {
                    if inner.is_event_tracked(event.event) {
                        inner.broadcast_event(event.event, event.value).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Wallet event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WalletError;
    use crate::events::WalletEvent;
    use crate::wallet::SignedMessage;
    use async_trait::async_trait;

    /// Wallet whose valid signed messages are `b"signed:" + plaintext`.
    struct StubWallet {
        native: bool,
        events: broadcast::Sender<WalletEvent>,
    }

    impl StubWallet {
        fn new(native: bool) -> Arc<Self> {
            let (events, _) = broadcast::channel(4);
            Arc::new(Self { native, events })
        }
    }

    #[async_trait]
    impl WalletBackend for StubWallet {
        fn address(&self) -> String {
            "deto1stubwallet".to_string()
        }

        fn balance(&self) -> u64 {
            0
        }

        fn height(&self) -> u64 {
            0
        }

        fn sign_data(&self, data: &[u8]) -> Vec<u8> {
            [b"signed:".as_slice(), data].concat()
        }

        fn check_signature(&self, signed: &[u8]) -> Result<SignedMessage, WalletError> {
            let message = signed
                .strip_prefix(b"signed:".as_slice())
                .ok_or_else(|| WalletError::Signature("bad prefix".into()))?;
            Ok(SignedMessage {
                signer: self.address(),
                message: message.to_vec(),
                native_network: self.native,
            })
        }

        fn is_daemon_online(&self) -> bool {
            false
        }

        fn daemon_endpoint(&self) -> Option<String> {
            None
        }

        async fn daemon_call(
            &self,
            _method: &str,
            _params: Option<Value>,
        ) -> Result<Value, WalletError> {
            Err(WalletError::Unavailable("stub wallet has no daemon".into()))
        }

        fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent> {
            self.events.subscribe()
        }
    }

    struct StubPrompt;

    #[async_trait]
    impl PromptHandler for StubPrompt {
        async fn authorize_application(&self, _app: &Application) -> bool {
            true
        }

        async fn request_permission(
            &self,
            _app: &Application,
            _request: &RpcRequest,
        ) -> Permission {
            Permission::Ask
        }
    }

    fn test_server(force_ask: bool) -> XswdServer {
        let config = XswdConfig::with_port(0)
            .force_ask(force_ask)
            .no_store(["Subscribe", "SignData"]);
        XswdServer::with_config(config, StubWallet::new(true), Arc::new(StubPrompt))
    }

    fn valid_descriptor() -> ApplicationData {
        ApplicationData {
            id: "a".repeat(64),
            name: "Test App".to_string(),
            description: "A test application".to_string(),
            url: "http://testapp.example".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanity_check_accepts_valid_descriptor() {
        let server = test_server(true);
        let mut data = valid_descriptor();
        assert!(server.inner.sanity_check(&mut data, None).is_ok());
    }

    #[test]
    fn test_sanity_check_field_rejections() {
        let server = test_server(true);

        let mut data = valid_descriptor();
        data.id = "abc".to_string();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidIdSize)
        );

        let mut data = valid_descriptor();
        data.id = "x".repeat(64);
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidIdEncoding)
        );

        let mut data = valid_descriptor();
        data.id = "A".repeat(64);
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidIdEncoding)
        );

        let mut data = valid_descriptor();
        data.name = "  ".to_string();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidName)
        );

        let mut data = valid_descriptor();
        data.description = "💻💻".to_string();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidDescription)
        );

        let mut data = valid_descriptor();
        data.url = format!("http://{}.example", "a".repeat(250));
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::UrlTooLong)
        );

        let mut data = valid_descriptor();
        data.url = "ftp://testapp.example".to_string();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidUrlScheme)
        );
    }

    #[test]
    fn test_sanity_check_origin_rules() {
        let server = test_server(true);

        // Mismatch between the advertised url and the transport origin.
        let mut data = valid_descriptor();
        assert_eq!(
            server
                .inner
                .sanity_check(&mut data, Some("http://other.example")),
            Err(AdmissionError::UrlOriginMismatch)
        );

        // An empty url is back-filled from the origin.
        let mut data = valid_descriptor();
        data.url = String::new();
        assert!(server
            .inner
            .sanity_check(&mut data, Some("http://origin.example"))
            .is_ok());
        assert_eq!(data.url, "http://origin.example");

        // No url and no origin leaves nothing to validate against.
        let mut data = valid_descriptor();
        data.url = String::new();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidUrlScheme)
        );
    }

    #[test]
    fn test_sanity_check_signature_rules() {
        let server = test_server(true);
        let wallet = StubWallet::new(true);

        let mut data = valid_descriptor();
        data.signature = vec![0u8; 513];
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::SignatureTooLong)
        );

        let mut data = valid_descriptor();
        data.signature = b"garbage".to_vec();
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::InvalidSignature)
        );

        let mut data = valid_descriptor();
        data.signature = wallet.sign_data(b"some other plaintext");
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::SignatureIdMismatch)
        );

        let mut data = valid_descriptor();
        data.signature = wallet.sign_data(data.id.as_bytes());
        assert!(server.inner.sanity_check(&mut data, None).is_ok());

        // A foreign signer is refused even with a valid signature.
        let foreign = XswdServer::with_config(
            XswdConfig::with_port(0),
            StubWallet::new(false),
            Arc::new(StubPrompt),
        );
        let mut data = valid_descriptor();
        data.signature = wallet.sign_data(data.id.as_bytes());
        assert_eq!(
            foreign.inner.sanity_check(&mut data, None),
            Err(AdmissionError::ForeignSigner)
        );
    }

    #[test]
    fn test_sanity_check_permission_rules() {
        let server = test_server(true);
        let wallet = StubWallet::new(true);

        // Requesting permissions without a signature is refused.
        let mut data = valid_descriptor();
        data.permissions
            .insert("GetBalance".to_string(), Permission::Ask);
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::PermissionsWithoutSignature)
        );

        // An oversized permission map is refused even when signed.
        let mut data = valid_descriptor();
        data.signature = wallet.sign_data(data.id.as_bytes());
        for i in 0..256 {
            data.permissions
                .insert(format!("{i}"), Permission::AlwaysDeny);
        }
        assert_eq!(
            server.inner.sanity_check(&mut data, None),
            Err(AdmissionError::TooManyPermissions)
        );
    }

    #[test]
    fn test_filter_permissions_force_ask_discards_everything() {
        let server = test_server(true);
        let mut data = valid_descriptor();
        data.permissions
            .insert("GetBalance".to_string(), Permission::AlwaysAllow);
        data.permissions
            .insert("GetHeight".to_string(), Permission::AlwaysDeny);

        server.inner.filter_permissions(&mut data);
        assert!(data.permissions.is_empty());
    }

    #[test]
    fn test_filter_permissions_applies_no_store_and_binding() {
        let server = test_server(false);
        let mut data = valid_descriptor();
        data.permissions
            .insert("GetBalance".to_string(), Permission::AlwaysAllow);
        data.permissions
            .insert("Subscribe".to_string(), Permission::AlwaysAllow);
        data.permissions
            .insert("Netrunner".to_string(), Permission::AlwaysDeny);

        server.inner.filter_permissions(&mut data);
        assert_eq!(data.permissions.len(), 1);
        assert_eq!(
            data.permissions.get("GetBalance"),
            Some(&Permission::AlwaysAllow)
        );
    }
}
