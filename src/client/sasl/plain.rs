//! SASL PLAIN (RFC 4616).

use super::{SaslCredentials, SaslError, SaslMechanism, SaslStep};
use crate::security::SecureString;

/// `authzid \0 authcid \0 password`, sent in one response.
#[derive(Debug, Default)]
pub struct Plain;

impl SaslMechanism for Plain {
    fn step(&mut self, response: Option<&[u8]>) -> Result<SaslStep, SaslError> {
        let Some(data) = response else {
            return Ok(SaslStep::Challenge(Vec::new()));
        };

        let parts: Vec<&[u8]> = data.split(|&b| b == 0).collect();
        let [_authzid, authcid, password] = parts.as_slice() else {
            return Err(SaslError::Malformed("expected three NUL separated fields"));
        };

        let authcid = std::str::from_utf8(authcid)
            .map_err(|_| SaslError::Malformed("authcid is not UTF-8"))?;
        if authcid.is_empty() {
            return Err(SaslError::Malformed("empty authcid"));
        }
        let password = std::str::from_utf8(password)
            .map_err(|_| SaslError::Malformed("password is not UTF-8"))?;

        Ok(SaslStep::Done(SaslCredentials {
            authcid: authcid.to_owned(),
            password: SecureString::new(password.to_owned()),
        }))
    }
}
