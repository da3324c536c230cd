//! The admin console reached by logging in without a network.

use std::sync::Arc;

use crate::config::HostSpec;
use crate::db::User;
use crate::registry::Registry;

const HELP: &[&str] = &[
    "Commands:",
    "  help                                     this list",
    "  backlog [context] [hours]                replay recent history (in a network session)",
    "  sessions                                 list active sessions",
    "  disconnect <user> <network>              drop a session's clients and reconnect it",
    "  networks                                 list networks you can use",
    "  listen                                   list listen addresses (admin)",
    "  listen add <address>:<port>[:ssl]        add a listen address (admin)",
    "  listen remove <address>:<port>           remove a listen address (admin)",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAction {
    List,
    Add(HostSpec),
    Remove(HostSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Backlog,
    Sessions,
    Disconnect { username: String, network: String },
    Listen(ListenAction),
    Networks,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Self::Help);
        };
        let args: Vec<&str> = words.collect();

        match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("help", _) => Ok(Self::Help),
            ("backlog", _) => Ok(Self::Backlog),
            ("sessions", []) => Ok(Self::Sessions),
            ("disconnect", [username, network]) => Ok(Self::Disconnect {
                username: username.to_lowercase(),
                network: (*network).to_owned(),
            }),
            ("disconnect", _) => Err("Usage: disconnect <user> <network>".to_owned()),
            ("networks", []) => Ok(Self::Networks),
            ("listen", []) => Ok(Self::Listen(ListenAction::List)),
            ("listen", [action, spec]) => {
                let spec: HostSpec = spec.parse()?;
                match action.to_ascii_lowercase().as_str() {
                    "add" => Ok(Self::Listen(ListenAction::Add(spec))),
                    "remove" | "rm" => Ok(Self::Listen(ListenAction::Remove(spec))),
                    _ => Err(format!("Unknown listen action: {action}")),
                }
            }
            ("listen", _) => Err("Usage: listen [add|remove <address>:<port>[:ssl]]".to_owned()),
            (other, _) => Err(format!("Unknown command: {other}. Try 'help'.")),
        }
    }

    fn requires_admin(&self) -> bool {
        matches!(self, Self::Listen(_))
    }
}

/// Run one console line for `user`, returning the reply lines.
pub async fn execute(registry: &Arc<Registry>, user: &User, line: &str) -> Vec<String> {
    let command = match ConsoleCommand::parse(line) {
        Ok(command) => command,
        Err(err) => return vec![err],
    };
    if command.requires_admin() && !user.is_admin() {
        return vec!["You need to be an admin to do that.".to_owned()];
    }

    match command {
        ConsoleCommand::Help => HELP.iter().map(|l| (*l).to_owned()).collect(),
        ConsoleCommand::Backlog => {
            vec!["Backlog replay is only available while connected to a network.".to_owned()]
        }
        ConsoleCommand::Sessions => {
            let lines: Vec<String> = registry
                .list_sessions()
                .await
                .into_iter()
                .filter(|s| user.is_admin() || s.username == user.username)
                .map(|s| {
                    format!(
                        "{}@{}: {} as {} (devices: {}) (rooms: {})",
                        s.username,
                        s.network,
                        s.phase,
                        s.nick,
                        list_or_none(&s.devices),
                        list_or_none(&s.rooms),
                    )
                })
                .collect();
            if lines.is_empty() {
                vec!["No active sessions.".to_owned()]
            } else {
                lines
            }
        }
        ConsoleCommand::Disconnect { username, network } => {
            if !user.is_admin() && username != user.username {
                return vec!["You can only disconnect your own sessions.".to_owned()];
            }
            match registry.force_disconnect(&username, &network).await {
                Ok(true) => vec![format!("Disconnected {username}@{network}.")],
                Ok(false) => vec![format!("No session for {username}@{network}.")],
                Err(err) => vec![format!("Error: {err}")],
            }
        }
        ConsoleCommand::Networks => match registry.list_networks().await {
            Ok(networks) => {
                let lines: Vec<String> = networks
                    .into_iter()
                    .filter(|n| user.is_admin() || n.is_public() || n.user_id == Some(user.id))
                    .map(|n| {
                        let scope = if n.is_public() { "public" } else { "private" };
                        format!("{} ({scope})", n.name)
                    })
                    .collect();
                if lines.is_empty() {
                    vec!["No networks.".to_owned()]
                } else {
                    lines
                }
            }
            Err(err) => vec![format!("Error: {err}")],
        },
        ConsoleCommand::Listen(ListenAction::List) => match registry.list_listen_addresses().await {
            Ok(addrs) if addrs.is_empty() => vec!["No listen addresses.".to_owned()],
            Ok(addrs) => addrs.iter().map(ToString::to_string).collect(),
            Err(err) => vec![format!("Error: {err}")],
        },
        ConsoleCommand::Listen(ListenAction::Add(spec)) => {
            match registry.add_listen_address(&spec.address, spec.port, spec.ssl).await {
                Ok(addr) => vec![format!("Listening on {addr}.")],
                Err(err) => vec![format!("Error: {err}")],
            }
        }
        ConsoleCommand::Listen(ListenAction::Remove(spec)) => {
            match registry.remove_listen_address(&spec.address, spec.port).await {
                Ok(true) => vec![format!("Stopped listening on {}:{}.", spec.address, spec.port)],
                Ok(false) => vec!["No such listen address.".to_owned()],
                Err(err) => vec![format!("Error: {err}")],
            }
        }
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_owned()
    } else {
        items.join(", ")
    }
}
