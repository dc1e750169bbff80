//! Ed25519 DID principal and verifier.

use super::{ED25519_PUB, error::Ed25519DidFromStrError};
use base58::{FromBase58, ToBase58};
use ed25519_dalek::{Verifier as _, VerifyingKey};
use mandate_varsig::{Did, EDDSA, Principal, Signature, Verifier};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// An `Ed25519` `did:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Verifier(pub VerifyingKey);

impl Ed25519Verifier {
    /// Raw public key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<VerifyingKey> for Ed25519Verifier {
    fn from(key: VerifyingKey) -> Self {
        Ed25519Verifier(key)
    }
}

impl From<&ed25519_dalek::SigningKey> for Ed25519Verifier {
    fn from(key: &ed25519_dalek::SigningKey) -> Self {
        Ed25519Verifier(key.verifying_key())
    }
}

impl std::fmt::Display for Ed25519Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut raw_bytes = Vec::with_capacity(34);
        raw_bytes.extend_from_slice(&ED25519_PUB);
        raw_bytes.extend_from_slice(&self.0.to_bytes());
        write!(f, "did:key:z{}", raw_bytes.to_base58())
    }
}

impl FromStr for Ed25519Verifier {
    type Err = Ed25519DidFromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let multibase = s
            .strip_prefix("did:key:")
            .filter(|rest| !rest.contains(':'))
            .ok_or(Ed25519DidFromStrError::InvalidDidHeader)?;
        let b58 = multibase
            .strip_prefix('z')
            .ok_or(Ed25519DidFromStrError::MissingBase58Prefix)?;
        let key_bytes = b58
            .from_base58()
            .map_err(|_| Ed25519DidFromStrError::InvalidBase58)?;
        let raw_arr = <[u8; 34]>::try_from(key_bytes.as_slice())
            .map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        if raw_arr[..2] != ED25519_PUB {
            return Err(Ed25519DidFromStrError::InvalidKey);
        }
        let key_arr: [u8; 32] = raw_arr[2..]
            .try_into()
            .map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        let key =
            VerifyingKey::from_bytes(&key_arr).map_err(|_| Ed25519DidFromStrError::InvalidKey)?;
        Ok(Ed25519Verifier(key))
    }
}

impl Verifier for Ed25519Verifier {
    async fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), signature::Error> {
        if signature.code() != EDDSA {
            return Err(signature::Error::new());
        }
        let signature = ed25519_dalek::Signature::from_slice(signature.raw())?;
        self.0.verify(msg, &signature)
    }
}

impl Principal for Ed25519Verifier {
    #[allow(clippy::expect_used)]
    fn did(&self) -> Did {
        self.to_string().parse().expect("valid DID string")
    }
}

impl Serialize for Ed25519Verifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ed25519Verifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let did = String::deserialize(deserializer)?;
        did.parse()
            .map_err(|error| serde::de::Error::custom(format!("{did}: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    fn test_verifier(seed: u8) -> Ed25519Verifier {
        Ed25519Verifier::from(&ed25519_dalek::SigningKey::from_bytes(&[seed; 32]))
    }

    #[test]
    fn it_round_trips_through_did_strings() -> TestResult {
        let verifier = test_verifier(0);
        let did = verifier.to_string();
        assert!(did.starts_with("did:key:z6Mk"));
        let parsed: Ed25519Verifier = did.parse()?;
        assert_eq!(parsed, verifier);
        Ok(())
    }

    #[test]
    fn it_rejects_invalid_headers() {
        assert_eq!(
            "not:a:did".parse::<Ed25519Verifier>(),
            Err(Ed25519DidFromStrError::InvalidDidHeader)
        );
        assert_eq!(
            "did:web:example.com".parse::<Ed25519Verifier>(),
            Err(Ed25519DidFromStrError::InvalidDidHeader)
        );
    }

    #[test]
    fn it_requires_the_base58_prefix() {
        assert_eq!(
            "did:key:abc".parse::<Ed25519Verifier>(),
            Err(Ed25519DidFromStrError::MissingBase58Prefix)
        );
    }

    #[test]
    fn it_serializes_as_a_did_string() -> TestResult {
        let verifier = test_verifier(3);
        let bytes = serde_ipld_dagcbor::to_vec(&verifier)?;
        let decoded: Ed25519Verifier = serde_ipld_dagcbor::from_slice(&bytes)?;
        assert_eq!(decoded, verifier);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_signatures_of_other_algorithms() {
        let verifier = test_verifier(1);
        let result = verifier
            .verify(b"payload", &Signature::non_standard())
            .await;
        assert!(result.is_err());
    }
}
