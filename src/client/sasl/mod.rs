//! SASL authentication.
//!
//! Mechanisms only turn client responses into credentials; the credential
//! check itself goes through [`crate::security::Authenticator`] like PASS
//! does.

mod plain;

pub use plain::Plain;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use thiserror::Error;
use zeroize::Zeroize;

use crate::security::SecureString;

/// AUTHENTICATE payloads are split into chunks of this many bytes.
pub const CHUNK_LEN: usize = 400;

/// Maximum size for an accumulated response.
const MAX_SASL_BUFFER: usize = 16384;

#[derive(Debug, Error)]
pub enum SaslError {
    #[error("invalid base64")]
    InvalidBase64,
    #[error("malformed response: {0}")]
    Malformed(&'static str),
    #[error("payload too large")]
    PayloadTooLarge,
}

/// Credentials a mechanism extracted from the exchange.
#[derive(Debug)]
pub struct SaslCredentials {
    /// Login string, `account@network:device` form.
    pub authcid: String,
    pub password: SecureString,
}

/// Outcome of one exchange step.
#[derive(Debug)]
pub enum SaslStep {
    Challenge(Vec<u8>),
    Done(SaslCredentials),
}

/// One server side of a SASL mechanism.
pub trait SaslMechanism: Send {
    /// `None` is the initial step, before the client sent anything.
    fn step(&mut self, response: Option<&[u8]>) -> Result<SaslStep, SaslError>;
}

pub type MechanismFactory = fn() -> Box<dyn SaslMechanism>;

/// Mechanisms offered to clients, keyed by upper-case name.
#[derive(Clone, Default)]
pub struct SaslRegistry {
    mechanisms: BTreeMap<String, MechanismFactory>,
}

impl SaslRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `PLAIN`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("PLAIN", || Box::new(Plain::default()));
        registry
    }

    pub fn register(&mut self, name: &str, factory: MechanismFactory) {
        self.mechanisms.insert(name.to_ascii_uppercase(), factory);
    }

    pub fn start(&self, name: &str) -> Option<SaslExchange> {
        self.mechanisms
            .get(&name.to_ascii_uppercase())
            .map(|factory| SaslExchange::new(factory()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mechanisms.keys().map(String::as_str)
    }
}

/// An exchange in progress on one connection.
pub struct SaslExchange {
    mechanism: Box<dyn SaslMechanism>,
    buffer: String,
}

impl SaslExchange {
    pub fn new(mechanism: Box<dyn SaslMechanism>) -> Self {
        Self {
            mechanism,
            buffer: String::new(),
        }
    }

    pub fn begin(&mut self) -> Result<SaslStep, SaslError> {
        self.mechanism.step(None)
    }

    /// Feed one `AUTHENTICATE` argument.
    ///
    /// Returns `None` while a full-length chunk says more is coming.
    pub fn feed(&mut self, chunk: &str) -> Result<Option<SaslStep>, SaslError> {
        if chunk != "+" {
            if self.buffer.len() + chunk.len() > MAX_SASL_BUFFER {
                self.buffer.zeroize();
                return Err(SaslError::PayloadTooLarge);
            }
            self.buffer.push_str(chunk);
            if chunk.len() == CHUNK_LEN {
                return Ok(None);
            }
        }

        let mut encoded = std::mem::take(&mut self.buffer);
        let decoded = STANDARD.decode(encoded.as_bytes());
        encoded.zeroize();
        let mut decoded = decoded.map_err(|_| SaslError::InvalidBase64)?;

        let step = self.mechanism.step(Some(&decoded));
        decoded.zeroize();
        step.map(Some)
    }
}

/// Encode a challenge as `AUTHENTICATE` arguments.
///
/// A payload that is empty or ends on a chunk boundary is terminated by `+`.
pub fn encode_challenge(challenge: &[u8]) -> Vec<String> {
    let encoded = STANDARD.encode(challenge);
    let mut chunks: Vec<String> = encoded
        .as_bytes()
        .chunks(CHUNK_LEN)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect();
    if chunks.last().is_none_or(|c| c.len() == CHUNK_LEN) {
        chunks.push("+".to_owned());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_payload(authcid: &str, password: &str) -> String {
        STANDARD.encode(format!("\0{authcid}\0{password}"))
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = SaslRegistry::standard();
        assert!(registry.start("plain").is_some());
        assert!(registry.start("DH-BLOWFISH").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["PLAIN"]);
    }

    #[test]
    fn test_plain_exchange() {
        let mut exchange = SaslRegistry::standard().start("PLAIN").unwrap();
        assert!(matches!(exchange.begin().unwrap(), SaslStep::Challenge(c) if c.is_empty()));

        let step = exchange
            .feed(&plain_payload("alice@libera:phone", "hunter2"))
            .unwrap();
        match step {
            Some(SaslStep::Done(creds)) => {
                assert_eq!(creds.authcid, "alice@libera:phone");
                assert_eq!(creds.password.as_str(), "hunter2");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_chunked_response() {
        // 300 raw bytes encode to exactly 400 base64 characters.
        let password = "p".repeat(300 - "\0alice\0".len());
        let payload = plain_payload("alice", &password);
        assert_eq!(payload.len(), CHUNK_LEN);

        let mut exchange = SaslRegistry::standard().start("PLAIN").unwrap();
        exchange.begin().unwrap();
        assert!(exchange.feed(&payload).unwrap().is_none());
        let step = exchange.feed("+").unwrap();
        assert!(matches!(step, Some(SaslStep::Done(c)) if c.password.as_str() == password));
    }

    #[test]
    fn test_bad_payloads() {
        let mut exchange = SaslRegistry::standard().start("PLAIN").unwrap();
        assert!(matches!(exchange.feed("!!!"), Err(SaslError::InvalidBase64)));

        let mut exchange = SaslRegistry::standard().start("PLAIN").unwrap();
        let oversized = "A".repeat(CHUNK_LEN);
        let mut result = Ok(None);
        for _ in 0..=(MAX_SASL_BUFFER / CHUNK_LEN) {
            result = exchange.feed(&oversized);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(SaslError::PayloadTooLarge)));
    }

    #[test]
    fn test_encode_challenge() {
        assert_eq!(encode_challenge(b""), vec!["+"]);
        assert_eq!(encode_challenge(b"hi"), vec!["aGk="]);

        let long = encode_challenge(&[0u8; 300]);
        assert_eq!(long.len(), 2);
        assert_eq!(long[0].len(), CHUNK_LEN);
        assert_eq!(long[1], "+");
    }
}
