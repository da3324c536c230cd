//! Client capability negotiation.
//!
//! The registry is built once at startup and shared by every connection.
//! Each connection keeps its own enabled set in [`ClientCaps`].

use std::collections::BTreeSet;

use crate::error::BouncerError;

pub const CAP_SASL: &str = "sasl";
pub const CAP_SERVER_TIME: &str = "server-time";
pub const CAP_ZNC_SERVER_TIME: &str = "znc.in/server-time-iso";

/// Capabilities offered to clients.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    caps: BTreeSet<String>,
    /// Capabilities that make the client accept message tags.
    tag_caps: BTreeSet<String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bouncer's own set.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CAP_SASL);
        registry.register_tag_cap(CAP_SERVER_TIME);
        registry.register_tag_cap(CAP_ZNC_SERVER_TIME);
        registry
    }

    pub fn register(&mut self, cap: &str) {
        self.caps.insert(cap.to_owned());
    }

    pub fn register_tag_cap(&mut self, cap: &str) {
        self.register(cap);
        self.tag_caps.insert(cap.to_owned());
    }

    pub fn contains(&self, cap: &str) -> bool {
        self.caps.contains(cap)
    }

    pub fn is_tag_cap(&self, cap: &str) -> bool {
        self.tag_caps.contains(cap)
    }

    /// Space separated list for `CAP LS`.
    pub fn ls(&self) -> String {
        join(&self.caps)
    }
}

/// Capabilities one connection has enabled.
#[derive(Debug, Default)]
pub struct ClientCaps {
    enabled: BTreeSet<String>,
}

impl ClientCaps {
    pub fn has(&self, cap: &str) -> bool {
        self.enabled.contains(cap)
    }

    /// Apply a `CAP REQ` list.
    ///
    /// Either every entry is applied or none is: a single unknown
    /// capability rejects the whole request.
    pub fn request(&mut self, registry: &CapabilityRegistry, req: &str) -> Result<(), BouncerError> {
        let mut adds = Vec::new();
        let mut removes = Vec::new();
        let mut rejected = Vec::new();

        for cap in req.split_whitespace() {
            let (name, remove) = match cap.strip_prefix('-') {
                Some(name) => (name, true),
                None => (cap, false),
            };
            if !registry.contains(name) {
                rejected.push(name);
            } else if remove {
                removes.push(name);
            } else {
                adds.push(name);
            }
        }

        if !rejected.is_empty() {
            return Err(BouncerError::CapabilityRejected(rejected.join(" ")));
        }

        self.enabled.extend(adds.into_iter().map(str::to_owned));
        for name in removes {
            self.enabled.remove(name);
        }
        Ok(())
    }

    /// Disable everything, returning the `-cap` list to acknowledge.
    pub fn clear(&mut self) -> String {
        let acked = self
            .enabled
            .iter()
            .map(|cap| format!("-{cap}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.enabled.clear();
        acked
    }

    /// Whether any enabled capability carries tags.
    pub fn tag_capable(&self, registry: &CapabilityRegistry) -> bool {
        self.enabled.iter().any(|cap| registry.is_tag_cap(cap))
    }

    /// Space separated list for `CAP LIST`.
    pub fn list(&self) -> String {
        join(&self.enabled)
    }
}

fn join(caps: &BTreeSet<String>) -> String {
    caps.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_ls() {
        let registry = CapabilityRegistry::standard();
        assert_eq!(registry.ls(), "sasl server-time znc.in/server-time-iso");
        assert!(registry.is_tag_cap(CAP_SERVER_TIME));
        assert!(!registry.is_tag_cap(CAP_SASL));
    }

    #[test]
    fn test_request_is_atomic() {
        let registry = CapabilityRegistry::standard();
        let mut caps = ClientCaps::default();

        let err = caps.request(&registry, "sasl unknown-cap").unwrap_err();
        assert!(matches!(err, BouncerError::CapabilityRejected(ref c) if c == "unknown-cap"));
        assert_eq!(caps.list(), "");

        caps.request(&registry, "sasl server-time").unwrap();
        assert_eq!(caps.list(), "sasl server-time");
        assert!(caps.tag_capable(&registry));

        assert!(caps.request(&registry, "-server-time -bogus").is_err());
        assert!(caps.has(CAP_SERVER_TIME));

        caps.request(&registry, "-server-time").unwrap();
        assert!(!caps.tag_capable(&registry));
        assert!(caps.has(CAP_SASL));
    }

    #[test]
    fn test_clear() {
        let registry = CapabilityRegistry::standard();
        let mut caps = ClientCaps::default();
        caps.request(&registry, "sasl znc.in/server-time-iso").unwrap();

        assert_eq!(caps.clear(), "-sasl -znc.in/server-time-iso");
        assert_eq!(caps.list(), "");
        assert!(!caps.tag_capable(&registry));
    }
}
