//! Sends command replies to the client that asked.

use std::collections::{HashMap, VecDeque};

use crate::client::handle::ConnId;
use slbnc_proto::numeric::{RPL_ENDOFNAMES, RPL_ENDOFWHO, RPL_NAMREPLY, RPL_WHOREPLY};

/// Commands whose replies go only to the requester.
const ROUTED: &[(&str, &[u16], u16)] = &[
    ("WHO", &[RPL_WHOREPLY], RPL_ENDOFWHO),
    ("NAMES", &[RPL_NAMREPLY], RPL_ENDOFNAMES),
];

/// Where a reply should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Broadcast,
    Only(ConnId),
}

/// FIFO of requesters per routed command.
#[derive(Debug, Default)]
pub struct PendingReplies {
    waiting: HashMap<&'static str, VecDeque<ConnId>>,
}

impl PendingReplies {
    /// Remember `conn` as the requester if `command` is routed.
    pub fn flag(&mut self, command: &str, conn: ConnId) {
        if let Some((name, _, _)) = ROUTED.iter().find(|(name, _, _)| command.eq_ignore_ascii_case(name)) {
            self.waiting.entry(*name).or_default().push_back(conn);
        }
    }

    /// Route a numeric reply. The end-of-list numeric releases its requester.
    pub fn route(&mut self, numeric: u16) -> Route {
        for (name, replies, end) in ROUTED {
            let Some(queue) = self.waiting.get_mut(name) else {
                continue;
            };
            if replies.contains(&numeric) {
                return queue.front().map_or(Route::Broadcast, |c| Route::Only(*c));
            }
            if numeric == *end {
                return queue.pop_front().map_or(Route::Broadcast, Route::Only);
            }
        }
        Route::Broadcast
    }

    /// A new link has no outstanding requests.
    pub fn clear(&mut self) {
        self.waiting.clear();
    }
}
