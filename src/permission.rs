//! Permission model for per-application method access.
//!
//! Permissions travel on the wire as integers (the original protocol
//! encoding) and split into transient decisions (`Allow`/`Deny`, valid for
//! one request) and persistent ones (`AlwaysAllow`/`AlwaysDeny`, cached on
//! the application record). `Ask` means "prompt the user".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Prefix routing a method to the upstream daemon instead of the wallet.
pub const DAEMON_PREFIX: &str = "DERO.";

/// A per-method access decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Permission {
    Ask,
    Allow,
    Deny,
    AlwaysAllow,
    AlwaysDeny,
}

impl Permission {
    /// True iff the decision grants access (`Allow` or `AlwaysAllow`).
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Allow | Self::AlwaysAllow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "Ask",
            Self::Allow => "Allow",
            Self::Deny => "Deny",
            Self::AlwaysAllow => "Always Allow",
            Self::AlwaysDeny => "Always Deny",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Permission> for u8 {
    fn from(perm: Permission) -> Self {
        match perm {
            Permission::Ask => 0,
            Permission::Allow => 1,
            Permission::Deny => 2,
            Permission::AlwaysAllow => 3,
            Permission::AlwaysDeny => 4,
        }
    }
}

impl TryFrom<u8> for Permission {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ask),
            1 => Ok(Self::Allow),
            2 => Ok(Self::Deny),
            3 => Ok(Self::AlwaysAllow),
            4 => Ok(Self::AlwaysDeny),
            other => Err(format!("unknown permission value {other}")),
        }
    }
}

/// Normalized form used to detect method-name aliases: lowercased with
/// underscores stripped, so `GetAddress`, `getaddress` and `get_address`
/// all collapse to `getaddress`.
///
/// This is an admission-time sanity filter only; dispatch always uses the
/// original method names.
pub fn normalize_method(name: &str) -> String {
    name.replace('_', "").to_lowercase()
}

/// Filter the permission map an application requested at admission.
///
/// Applies, in order:
/// 1. drop daemon-prefixed methods (proxied calls bypass permissions),
/// 2. drop transient `Allow`/`Deny` values (never persisted),
/// 3. drop methods that are not bound locally,
/// 4. drop `AlwaysAllow` for methods that refuse cached grants,
/// 5. drop every normalized alias group whose members disagree.
pub fn filter_requested(
    requested: &HashMap<String, Permission>,
    is_bound: impl Fn(&str) -> bool,
    can_store: impl Fn(&str) -> bool,
) -> HashMap<String, Permission> {
    let mut kept: HashMap<String, Permission> = HashMap::new();
    let mut normalized: HashMap<String, Permission> = HashMap::new();
    let mut conflicting: Vec<String> = Vec::new();

    for (method, &perm) in requested {
        if method.starts_with(DAEMON_PREFIX) {
            tracing::debug!(%method, %perm, "Daemon requests bypass permissions, dropping");
            continue;
        }

        if perm == Permission::Allow || perm == Permission::Deny {
            tracing::debug!(%method, %perm, "Transient permission requested, dropping");
            continue;
        }

        if !is_bound(method) {
            tracing::debug!(%method, %perm, "Unbound method requested, dropping");
            continue;
        }

        if perm == Permission::AlwaysAllow && !can_store(method) {
            tracing::debug!(%method, %perm, "Method refuses cached grants, dropping");
            continue;
        }

        let norm = normalize_method(method);
        match normalized.get(&norm) {
            Some(&seen) if seen != perm => {
                tracing::debug!(%method, %perm, "Conflicting permissions for method aliases");
                conflicting.push(norm);
            }
            _ => {
                normalized.insert(norm, perm);
            }
        }
        kept.insert(method.clone(), perm);
    }

    // A disagreement poisons the whole alias group, not just the later entry.
    kept.retain(|method, _| !conflicting.contains(&normalize_method(method)));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(method: &str) -> bool {
        matches!(
            method,
            "GetAddress" | "GetBalance" | "GetHeight" | "GetTransfers" | "Transfer" | "Subscribe"
        )
    }

    fn storable(method: &str) -> bool {
        method != "Subscribe"
    }

    #[test]
    fn test_wire_roundtrip() {
        for perm in [
            Permission::Ask,
            Permission::Allow,
            Permission::Deny,
            Permission::AlwaysAllow,
            Permission::AlwaysDeny,
        ] {
            let encoded = serde_json::to_string(&perm).unwrap();
            let decoded: Permission = serde_json::from_str(&encoded).unwrap();
            assert_eq!(perm, decoded);
        }

        assert_eq!(serde_json::to_string(&Permission::AlwaysDeny).unwrap(), "4");
        assert!(serde_json::from_str::<Permission>("9").is_err());
    }

    #[test]
    fn test_positive_permissions() {
        assert!(Permission::Allow.is_positive());
        assert!(Permission::AlwaysAllow.is_positive());
        assert!(!Permission::Ask.is_positive());
        assert!(!Permission::Deny.is_positive());
        assert!(!Permission::AlwaysDeny.is_positive());
    }

    #[test]
    fn test_normalize_strips_underscores_and_case() {
        assert_eq!(normalize_method("GetAddress"), "getaddress");
        assert_eq!(normalize_method("get_address"), "getaddress");
        assert_eq!(normalize_method("GETADDRESS"), "getaddress");
    }

    #[test]
    fn test_filter_drops_daemon_and_transient() {
        let requested = HashMap::from([
            ("DERO.Ping".to_string(), Permission::AlwaysDeny),
            ("DERO.GetInfo".to_string(), Permission::Ask),
            ("GetTransfers".to_string(), Permission::Allow),
            ("Transfer".to_string(), Permission::Deny),
            ("GetAddress".to_string(), Permission::AlwaysAllow),
        ]);

        let kept = filter_requested(&requested, bound, storable);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("GetAddress"), Some(&Permission::AlwaysAllow));
    }

    #[test]
    fn test_filter_drops_unbound_and_unstorable() {
        let requested = HashMap::from([
            ("Netrunner".to_string(), Permission::AlwaysDeny),
            ("Subscribe".to_string(), Permission::AlwaysAllow),
            ("GetBalance".to_string(), Permission::Ask),
        ]);

        let kept = filter_requested(&requested, bound, storable);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("GetBalance"), Some(&Permission::Ask));
    }

    #[test]
    fn test_filter_drops_conflicting_alias_group() {
        let requested = HashMap::from([
            ("GetHeight".to_string(), Permission::Ask),
            ("getheight".to_string(), Permission::AlwaysAllow),
            ("GetBalance".to_string(), Permission::AlwaysDeny),
        ]);

        // `getheight` is not bound, so make it bound for this case only.
        let kept = filter_requested(&requested, |m| bound(m) || m == "getheight", storable);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("GetBalance"), Some(&Permission::AlwaysDeny));
    }

    #[test]
    fn test_filter_keeps_agreeing_alias_group() {
        let requested = HashMap::from([
            ("GetBalance".to_string(), Permission::Ask),
            ("getbalance".to_string(), Permission::Ask),
        ]);

        let kept = filter_requested(&requested, |m| bound(m) || m == "getbalance", storable);
        assert_eq!(kept.len(), 2);
    }
}
