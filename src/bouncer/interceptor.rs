//! Hooks that see every message passing through a session.
//!
//! The backlog is the only built-in interceptor; the seam exists so the
//! session core never depends on how history is stored.

use async_trait::async_trait;
use slbnc_proto::Message;

use crate::client::handle::ClientHandle;

/// Whether a message continues on to the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The interceptor consumed the message.
    Stop,
}

/// A read-only view of the session handed to interceptors.
pub struct SessionContext<'a> {
    /// The bounced nick.
    pub nick: &'a str,
    /// Name of the pseudo identity, without the leading `-`.
    pub server_name: &'a str,
    /// Devices of the clients currently attached.
    pub devices: &'a [String],
}

impl SessionContext<'_> {
    /// The pseudo identity's prefix, `-name!~name@name`.
    pub fn pseudo_prefix(&self) -> String {
        pseudo_prefix(self.server_name)
    }
}

pub fn pseudo_prefix(name: &str) -> String {
    format!("-{name}!~{name}@{name}")
}

#[async_trait]
pub trait MessageInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called for each upstream message before the session acts on it. The
    /// message may be modified in place.
    async fn on_server_message(&mut self, ctx: &SessionContext<'_>, msg: &mut Message) -> Flow {
        let _ = (ctx, msg);
        Flow::Continue
    }

    /// Called for each message from an attached client.
    async fn on_client_message(
        &mut self,
        ctx: &SessionContext<'_>,
        client: &ClientHandle,
        msg: &mut Message,
    ) -> Flow {
        let _ = (ctx, client, msg);
        Flow::Continue
    }

    /// Called once a client has finished attaching to a ready session.
    async fn on_client_attached(&mut self, ctx: &SessionContext<'_>, client: &ClientHandle) {
        let _ = (ctx, client);
    }
}

/// Identifies the session an interceptor is being built for.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user_id: i64,
    pub username: String,
    pub network: String,
    pub network_user_id: i64,
}

/// Builds the interceptors for each new session.
pub trait InterceptorFactory: Send + Sync {
    fn build(&self, session: &SessionInfo) -> Option<Box<dyn MessageInterceptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::BacklogInterceptor;

    fn shareable<T: Send + Sync + ?Sized>() {}

    #[test]
    fn test_interceptors_are_shareable() {
        shareable::<dyn MessageInterceptor>();
        shareable::<Vec<Box<dyn MessageInterceptor>>>();
        shareable::<BacklogInterceptor>();
    }
}
