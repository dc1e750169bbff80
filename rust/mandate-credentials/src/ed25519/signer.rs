//! Ed25519 signer implementation.

use super::{error::Ed25519KeyError, verifier::Ed25519Verifier};
use ed25519_dalek::{Signer as _, SigningKey};
use mandate_varsig::{Did, EDDSA, Principal, Signature, Signer};
use serde::Serialize;

/// An `Ed25519` `did:key` signer.
///
/// A signer normally presents itself as its `did:key`. Services that are
/// known by a different identifier (typically `did:web`) can wrap their key
/// with [`Ed25519Signer::with_did`]; verifiers then need an alias registered
/// on the [resolver](super::Ed25519KeyResolver).
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
    verifier: Ed25519Verifier,
    did: Did,
}

impl From<SigningKey> for Ed25519Signer {
    fn from(key: SigningKey) -> Self {
        let verifier = Ed25519Verifier::from(&key);
        let did = verifier.did();
        Self { key, verifier, did }
    }
}

impl Ed25519Signer {
    /// Generate a new Ed25519 keypair with random bytes from `getrandom`.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails.
    pub fn generate() -> Result<Self, Ed25519KeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Import a keypair from its 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed has the wrong length.
    pub fn import(seed: &[u8]) -> Result<Self, Ed25519KeyError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| Ed25519KeyError::InvalidSeedLength(seed.len()))?;
        Ok(SigningKey::from_bytes(&seed).into())
    }

    /// Export the 32-byte seed.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Present this key under a different DID.
    #[must_use]
    pub fn with_did(self, did: Did) -> Self {
        Self { did, ..self }
    }

    /// Get the associated Ed25519 DID (verifier).
    #[must_use]
    pub const fn verifier(&self) -> &Ed25519Verifier {
        &self.verifier
    }
}

impl std::fmt::Display for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.did)
    }
}

impl Signer for Ed25519Signer {
    async fn sign(&self, msg: &[u8]) -> Result<Signature, signature::Error> {
        let signature = self.key.try_sign(msg)?;
        Ok(Signature::new(EDDSA, signature.to_bytes().to_vec()))
    }
}

impl Principal for Ed25519Signer {
    fn did(&self) -> Did {
        self.did.clone()
    }
}

impl Serialize for Ed25519Signer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.did.serialize(serializer)
    }
}
