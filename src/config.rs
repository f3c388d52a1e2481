//! Server configuration surface.

/// Default XSWD port. Production deployments should keep 44326, as the
/// well-known port is how dApps discover a local wallet.
pub const XSWD_PORT: u16 = 44326;

/// Methods that never cache an `AlwaysAllow` decision.
pub const DEFAULT_NO_STORE: &[&str] = &[
    "Subscribe",
    "SignData",
    "CheckSignature",
    "GetDaemon",
    "query_key",
    "QueryKey",
];

/// Tunable configuration for an XSWD server.
#[derive(Debug, Clone)]
pub struct XswdConfig {
    /// TCP port the websocket endpoint binds to. Port 0 picks a free one.
    pub port: u16,
    /// When set, every permission an application requests at connection is
    /// discarded and all wallet methods prompt the user.
    pub force_ask: bool,
    /// Methods excluded from caching `AlwaysAllow`.
    pub no_store: Vec<String>,
}

impl Default for XswdConfig {
    fn default() -> Self {
        Self {
            port: XSWD_PORT,
            force_ask: true,
            no_store: DEFAULT_NO_STORE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl XswdConfig {
    /// Configuration for an explicit port; starts with `force_ask`
    /// disabled and no `no_store` methods, like the original port-based
    /// constructor.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            force_ask: false,
            no_store: Vec::new(),
        }
    }

    pub fn force_ask(mut self, force_ask: bool) -> Self {
        self.force_ask = force_ask;
        self
    }

    pub fn no_store(mut self, methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.no_store = methods.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = XswdConfig::default();
        assert_eq!(config.port, 44326);
        assert!(config.force_ask);
        assert!(config.no_store.iter().any(|m| m == "SignData"));
    }

    #[test]
    fn test_port_config_defaults() {
        let config = XswdConfig::with_port(0);
        assert_eq!(config.port, 0);
        assert!(!config.force_ask);
        assert!(config.no_store.is_empty());
    }
}
