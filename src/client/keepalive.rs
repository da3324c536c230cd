//! Ping/pong liveness for attached clients.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    Idle,
    SendPing,
    TimedOut,
}

/// Sends a PING every `interval` and expects the PONG within `timeout`.
///
/// The next PING is only scheduled once the previous one was answered, so
/// unsolicited PONGs do not stack timers.
#[derive(Debug)]
pub struct Keepalive {
    interval: Duration,
    timeout: Duration,
    next_ping: Option<Instant>,
    deadline: Option<Instant>,
}

impl Keepalive {
    /// A disarmed keepalive.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_ping: None,
            deadline: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_ping = Some(now + self.interval);
        self.deadline = None;
    }

    /// When the connection loop should call [`Self::on_timer`].
    pub fn wake_at(&self) -> Option<Instant> {
        self.deadline.or(self.next_ping)
    }

    pub fn on_timer(&mut self, now: Instant) -> KeepaliveAction {
        if let Some(deadline) = self.deadline {
            return if now >= deadline {
                KeepaliveAction::TimedOut
            } else {
                KeepaliveAction::Idle
            };
        }
        match self.next_ping {
            Some(at) if now >= at => {
                self.next_ping = None;
                self.deadline = Some(now + self.timeout);
                KeepaliveAction::SendPing
            }
            _ => KeepaliveAction::Idle,
        }
    }

    pub fn on_pong(&mut self, now: Instant) {
        if self.deadline.take().is_some() {
            self.next_ping = Some(now + self.interval);
        }
    }
}
