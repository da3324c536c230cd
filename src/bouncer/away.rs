//! Aggregate away status across attached clients.

use slbnc_proto::Message;
use std::collections::BTreeMap;

use crate::client::handle::ConnId;

const DEFAULT_AWAY: &str = "Away";

/// Per-client away messages, folded into the one status the upstream sees.
///
/// If any client is present the user is present. Otherwise the first
/// non-empty message wins. With no clients at all the user is away.
#[derive(Debug, Default)]
pub struct AwayTracker {
    clients: BTreeMap<ConnId, Option<String>>,
    /// What the upstream was last told. `None` before anything was sent on
    /// the current link.
    sent: Option<Option<String>>,
}

impl AwayTracker {
    pub fn attach(&mut self, id: ConnId) {
        self.clients.insert(id, None);
    }

    pub fn detach(&mut self, id: ConnId) {
        self.clients.remove(&id);
    }

    /// Record a client's `AWAY`. An empty or missing message means back.
    pub fn set(&mut self, id: ConnId, message: Option<&str>) {
        let message = message.filter(|m| !m.is_empty()).map(str::to_owned);
        self.clients.insert(id, message);
    }

    /// `None` when present, `Some(message)` when away.
    pub fn aggregate(&self) -> Option<String> {
        if self.clients.values().any(Option::is_none) {
            return None;
        }
        Some(
            self.clients
                .values()
                .flatten()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_AWAY.to_owned()),
        )
    }

    /// Forget what was sent; the next [`update`](Self::update) always
    /// produces a message.
    pub fn reset(&mut self) {
        self.sent = None;
    }

    /// The `AWAY` to send upstream, if the aggregate changed.
    pub fn update(&mut self) -> Option<Message> {
        let current = self.aggregate();
        if self.sent.as_ref() == Some(&current) {
            return None;
        }
        let msg = match &current {
            None => Message::new("AWAY", Vec::<String>::new()),
            Some(text) => Message::new("AWAY", [text.as_str()]).with_trailing(),
        };
        self.sent = Some(current);
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_client_wins() {
        let mut away = AwayTracker::default();
        away.attach(1);
        away.attach(2);
        away.set(1, Some("busy"));
        assert_eq!(away.aggregate(), None);

        away.detach(2);
        assert_eq!(away.aggregate().as_deref(), Some("busy"));
    }

    #[test]
    fn test_defaults_to_away() {
        let mut away = AwayTracker::default();
        assert_eq!(away.aggregate().as_deref(), Some("Away"));
        away.attach(1);
        away.set(1, Some(""));
        assert_eq!(away.aggregate(), None);
    }

    #[test]
    fn test_update_only_on_change() {
        let mut away = AwayTracker::default();
        away.attach(1);
        assert_eq!(away.update().unwrap().to_string(), "AWAY");
        assert!(away.update().is_none());

        away.set(1, Some("gone fishing"));
        assert_eq!(away.update().unwrap().to_string(), "AWAY :gone fishing");
        assert!(away.update().is_none());

        away.reset();
        assert_eq!(away.update().unwrap().to_string(), "AWAY :gone fishing");
    }
}
