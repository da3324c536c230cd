//! Channels the bounced user is in.

use slbnc_proto::Message;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Room {
    pub topic: Option<String>,
    pub topic_setter: Option<String>,
    pub topic_time: Option<String>,
}

/// Room names are compared case-insensitively, keyed by lower case, and
/// remember the spelling they were joined with.
#[derive(Debug, Default)]
pub struct Rooms {
    rooms: BTreeMap<String, (String, Room)>,
}

impl Rooms {
    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut rooms = Self::default();
        for name in names {
            rooms.insert(&name);
        }
        rooms
    }

    /// Returns `true` if the room is new.
    pub fn insert(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        if self.rooms.contains_key(&key) {
            return false;
        }
        self.rooms.insert(key, (name.to_owned(), Room::default()));
        true
    }

    /// Returns `true` if the room was known.
    pub fn remove(&mut self, name: &str) -> bool {
        self.rooms.remove(&name.to_lowercase()).is_some()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.get_mut(&name.to_lowercase()).map(|(_, room)| room)
    }

    pub fn names(&self) -> Vec<String> {
        self.rooms.values().map(|(name, _)| name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Room)> {
        self.rooms.values().map(|(name, room)| (name.as_str(), room))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// What a newly attached client sees for a room it did not join itself:
/// its own `JOIN`, then topic numerics when the topic is known.
pub fn simulated_join(nick: &str, server: &str, name: &str, room: &Room) -> Vec<Message> {
    let mut out = vec![Message::new("JOIN", [name]).with_prefix(nick)];
    if let Some(topic) = &room.topic {
        out.push(
            Message::new("332", [nick, name, topic.as_str()])
                .with_prefix(server)
                .with_trailing(),
        );
        if let (Some(setter), Some(time)) = (&room.topic_setter, &room.topic_time) {
            out.push(Message::new("333", [nick, name, setter.as_str(), time.as_str()]).with_prefix(server));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_membership() {
        let mut rooms = Rooms::default();
        assert!(rooms.insert("#Rust"));
        assert!(!rooms.insert("#rust"));
        assert_eq!(rooms.names(), vec!["#Rust"]);

        rooms.get_mut("#RUST").unwrap().topic = Some("fearless".into());
        assert_eq!(rooms.iter().next().unwrap().1.topic.as_deref(), Some("fearless"));

        assert!(rooms.remove("#rUST"));
        assert!(!rooms.remove("#rust"));
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_simulated_join() {
        let room = Room {
            topic: Some("hello world".into()),
            topic_setter: Some("op".into()),
            topic_time: Some("1700000000".into()),
        };
        let lines: Vec<String> = simulated_join("me", "irc.test", "#r", &room)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                ":me JOIN #r",
                ":irc.test 332 me #r :hello world",
                ":irc.test 333 me #r op 1700000000",
            ]
        );

        let bare = simulated_join("me", "irc.test", "#r", &Room::default());
        assert_eq!(bare.len(), 1);
    }
}
