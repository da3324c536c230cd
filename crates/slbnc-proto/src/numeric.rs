//! Numeric replies the bouncer inspects or synthesizes.

#![allow(missing_docs)]

pub const RPL_WELCOME: u16 = 1;
pub const RPL_ENDOFWHO: u16 = 315;
pub const RPL_TOPIC: u16 = 332;
pub const RPL_TOPICWHOTIME: u16 = 333;
pub const RPL_WHOREPLY: u16 = 352;
pub const RPL_NAMREPLY: u16 = 353;
pub const RPL_ENDOFNAMES: u16 = 366;
pub const RPL_MOTD: u16 = 372;
pub const RPL_MOTDSTART: u16 = 375;
pub const RPL_ENDOFMOTD: u16 = 376;
pub const ERR_NOMOTD: u16 = 422;
pub const ERR_NICKNAMEINUSE: u16 = 433;
pub const RPL_LOGGEDIN: u16 = 900;
pub const RPL_SASLSUCCESS: u16 = 903;
pub const ERR_SASLFAIL: u16 = 904;
pub const ERR_SASLABORTED: u16 = 906;
pub const ERR_SASLALREADY: u16 = 907;

/// Whether a numeric belongs to the registration burst a server sends once
/// per connection, which the bouncer replays to every attaching client.
pub fn is_welcome(code: u16) -> bool {
    matches!(code, 1..=99 | 250..=269 | 372 | 375 | 376)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_welcome() {
        for code in [1, 5, 251, 265, 372, 375, 376] {
            assert!(is_welcome(code), "{code}");
        }
        for code in [211, 301, 332, 353, 401, 433] {
            assert!(!is_welcome(code), "{code}");
        }
    }
}
