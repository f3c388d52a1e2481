//! Application descriptors and admitted session records.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::events::EventType;
use crate::limiter::RateLimiter;
use crate::permission::Permission;

/// Requests allowed per second for one application.
const REQUESTS_PER_SECOND: f64 = 10.0;
/// Burst capacity of the per-application token bucket.
const REQUEST_BURST: u32 = 20;

/// The identity descriptor a dApp sends as its first websocket frame.
///
/// Every field is optional at the JSON level; validation happens at
/// admission so that a structurally valid but semantically bad descriptor
/// yields a descriptive rejection instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub permissions: HashMap<String, Permission>,
}

/// First server frame after the descriptor: the admission verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub message: String,
    pub accepted: bool,
}

/// Server-side record of an admitted (or currently admitting) application.
///
/// Identity fields are frozen copies of the validated descriptor. The
/// mutable parts (`permissions`, `registered_events`, the `is_requesting`
/// latch) are only touched under the dispatcher's serialization, so plain
/// mutexes held for the duration of one map operation are enough.
pub struct Application {
    id: String,
    name: String,
    description: String,
    url: String,
    signature: Vec<u8>,
    permissions: Mutex<HashMap<String, Permission>>,
    registered_events: Mutex<HashSet<EventType>>,
    is_requesting: AtomicBool,
    on_close: Notify,
    limiter: RateLimiter,
}

impl Application {
    /// Build the record from a validated, permission-filtered descriptor.
    pub fn new(data: ApplicationData) -> Self {
        Self {
            id: data.id,
            name: data.name,
            description: data.description,
            url: data.url,
            signature: data.signature,
            permissions: Mutex::new(data.permissions),
            registered_events: Mutex::new(HashSet::new()),
            is_requesting: AtomicBool::new(false),
            on_close: Notify::new(),
            limiter: RateLimiter::new(REQUESTS_PER_SECOND, REQUEST_BURST),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The descriptor's signature bytes, empty when none was presented.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Snapshot of the stored permission map.
    pub fn permissions(&self) -> HashMap<String, Permission> {
        self.permissions.lock().expect("permissions lock").clone()
    }

    pub fn permission_for(&self, method: &str) -> Option<Permission> {
        self.permissions
            .lock()
            .expect("permissions lock")
            .get(method)
            .copied()
    }

    /// Persist a sticky decision for `method`. Callers are responsible for
    /// only storing `AlwaysAllow`/`AlwaysDeny`.
    pub fn store_permission(&self, method: &str, permission: Permission) {
        self.permissions
            .lock()
            .expect("permissions lock")
            .insert(method.to_string(), permission);
    }

    /// Register interest in an event stream. Returns `false` if already
    /// subscribed.
    pub fn subscribe(&self, event: EventType) -> bool {
        self.registered_events
            .lock()
            .expect("events lock")
            .insert(event)
    }

    /// Drop interest in an event stream. Returns `false` if not subscribed.
    pub fn unsubscribe(&self, event: EventType) -> bool {
        self.registered_events
            .lock()
            .expect("events lock")
            .remove(&event)
    }

    pub fn is_subscribed(&self, event: EventType) -> bool {
        self.registered_events
            .lock()
            .expect("events lock")
            .contains(&event)
    }

    /// True while a user prompt for this application is outstanding.
    pub fn is_requesting(&self) -> bool {
        self.is_requesting.load(Ordering::SeqCst)
    }

    pub fn set_requesting(&self, value: bool) {
        self.is_requesting.store(value, Ordering::SeqCst);
    }

    /// Wake whoever is blocked on a prompt for this application. Fired by
    /// the close, removal and shutdown paths while `is_requesting` holds.
    pub fn signal_close(&self) {
        self.on_close.notify_one();
    }

    /// Resolves when the session owning this record goes away.
    pub async fn closed(&self) {
        self.on_close.notified().await;
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("is_requesting", &self.is_requesting())
            .finish()
    }
}

/// Byte strings cross the wire as base64 (the descriptor's `signature`,
/// signing method params and results).
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_decodes_with_missing_fields() {
        let data: ApplicationData = serde_json::from_str("{}").unwrap();
        assert!(data.id.is_empty());
        assert!(data.signature.is_empty());
        assert!(data.permissions.is_empty());
    }

    #[test]
    fn test_descriptor_signature_is_base64() {
        let data: ApplicationData =
            serde_json::from_str(r#"{"id":"ab","signature":"aGVsbG8="}"#).unwrap();
        assert_eq!(data.signature, b"hello");

        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded["signature"], "aGVsbG8=");
    }

    #[test]
    fn test_descriptor_rejects_bad_base64() {
        let result = serde_json::from_str::<ApplicationData>(r#"{"signature":"%%%"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let app = Application::new(ApplicationData::default());
        assert!(app.subscribe(EventType::NewBalance));
        assert!(!app.subscribe(EventType::NewBalance));
        assert!(app.is_subscribed(EventType::NewBalance));
        assert!(app.unsubscribe(EventType::NewBalance));
        assert!(!app.unsubscribe(EventType::NewBalance));
    }

    #[test]
    fn test_permission_storage() {
        let app = Application::new(ApplicationData::default());
        assert_eq!(app.permission_for("Transfer"), None);
        app.store_permission("Transfer", Permission::AlwaysDeny);
        assert_eq!(app.permission_for("Transfer"), Some(Permission::AlwaysDeny));
    }
}
