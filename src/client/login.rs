//! The `account@network:device` login string.

/// Device name used when the login string does not carry one.
pub const DEFAULT_DEVICE: &str = "default";

/// Parsed login string, lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub account: String,
    /// `None` attaches to the admin console.
    pub network: Option<String>,
    pub device: String,
}

impl Login {
    /// Split `account[@network[:device]]`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.to_lowercase();
        let (account, conn) = match raw.split_once('@') {
            Some((account, conn)) => (account, Some(conn)),
            None => (raw.as_str(), None),
        };
        let (network, device) = match conn {
            Some(conn) => match conn.split_once(':') {
                Some((network, device)) => (network, Some(device)),
                None => (conn, None),
            },
            None => ("", None),
        };

        Self {
            account: account.to_owned(),
            network: (!network.is_empty()).then(|| network.to_owned()),
            device: device
                .filter(|d| !d.is_empty())
                .unwrap_or(DEFAULT_DEVICE)
                .to_owned(),
        }
    }

    /// Label used in logs, e.g. `alice-libera-phone` or `alice-console`.
    pub fn label(&self) -> String {
        match &self.network {
            Some(network) => format!("{}-{}-{}", self.account, network, self.device),
            None => format!("{}-console", self.account),
        }
    }
}
