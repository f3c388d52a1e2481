//! Wallet event types fanned out to subscribed applications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wallet event streams an application can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    NewBalance,
    NewTopoheight,
    NewEntry,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewBalance => "NewBalance",
            Self::NewTopoheight => "NewTopoheight",
            Self::NewEntry => "NewEntry",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an unsolicited event notification, carried in the `result`
/// field of a response frame with an empty id.
#[derive(Debug, Clone, Serialize)]
pub struct EventNotification {
    pub event: EventType,
    pub value: Value,
}

/// An event emitted by the wallet backend's broadcast stream.
#[derive(Debug, Clone)]
pub struct WalletEvent {
    pub event: EventType,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_serialize_as_names() {
        assert_eq!(
            serde_json::to_string(&EventType::NewTopoheight).unwrap(),
            "\"NewTopoheight\""
        );
        let parsed: EventType = serde_json::from_str("\"NewBalance\"").unwrap();
        assert_eq!(parsed, EventType::NewBalance);
    }

    #[test]
    fn test_notification_shape() {
        let notification = EventNotification {
            event: EventType::NewTopoheight,
            value: serde_json::json!(600),
        };
        let encoded = serde_json::to_value(&notification).unwrap();
        assert_eq!(encoded["event"], "NewTopoheight");
        assert_eq!(encoded["value"], 600);
    }
}
