//! The `address:signature:timestamp` bearer credential.

use std::fmt;
use std::str::FromStr;

use crate::CredentialError;

/// A bearer credential as carried in `Authorization: Bearer <token>`.
///
/// The fields are kept as the client sent them. Parsing only checks the
/// shape; whether the signature is valid, and for which address, is the
/// verifier's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredential {
    pub address: String,
    pub signature: String,
    /// Milliseconds since the Unix epoch, as claimed by the client.
    pub timestamp: u64,
}

impl AuthCredential {
    pub fn new(
        address: impl Into<String>,
        signature: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            address: address.into(),
            signature: signature.into(),
            timestamp,
        }
    }
}

impl FromStr for AuthCredential {
    type Err = CredentialError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = token.split(':').collect();
        let [address, signature, timestamp] = fields.as_slice() else {
            return Err(CredentialError::FieldCount(fields.len()));
        };

        if address.is_empty() || signature.is_empty() || timestamp.is_empty()
        {
            return Err(CredentialError::EmptyField);
        }

        let timestamp = timestamp
            .parse::<u64>()
            .map_err(|_| CredentialError::InvalidTimestamp)?;

        Ok(Self::new(*address, *signature, timestamp))
    }
}

impl fmt::Display for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.address, self.signature, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_token() {
        let cred: AuthCredential = "0xabc:0xdeadbeef:1700000000000".parse().unwrap();

        assert_eq!(cred.address, "0xabc");
        assert_eq!(cred.signature, "0xdeadbeef");
        assert_eq!(cred.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_parse_two_fields_fails_with_count() {
        let result = "0xabc:0xdead".parse::<AuthCredential>();

        assert_eq!(result, Err(CredentialError::FieldCount(2)));
    }

    #[test]
    fn test_parse_four_fields_fails_with_count() {
        let result = "a:b:1:extra".parse::<AuthCredential>();

        assert_eq!(result, Err(CredentialError::FieldCount(4)));
    }

    #[test]
    fn test_parse_empty_signature_fails() {
        let result = "0xabc::1".parse::<AuthCredential>();

        assert_eq!(result, Err(CredentialError::EmptyField));
    }

    #[test]
    fn test_parse_non_numeric_timestamp_fails() {
        let result = "0xabc:0xdead:yesterday".parse::<AuthCredential>();

        assert_eq!(result, Err(CredentialError::InvalidTimestamp));
    }

    #[test]
    fn test_parse_negative_timestamp_fails() {
        let result = "0xabc:0xdead:-5".parse::<AuthCredential>();

        assert_eq!(result, Err(CredentialError::InvalidTimestamp));
    }

    #[test]
    fn test_display_reproduces_token() {
        let cred = AuthCredential::new("0xabc", "0xdead", 7);

        assert_eq!(cred.to_string(), "0xabc:0xdead:7");
    }
}
