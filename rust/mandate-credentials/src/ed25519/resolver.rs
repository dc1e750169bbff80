//! Ed25519 DID key resolver.

use std::collections::HashMap;

use super::{error::Ed25519ResolveError, verifier::Ed25519Verifier};
use mandate_varsig::{Did, Resolver, Verifier};

/// Resolves `did:key` strings to Ed25519 verifiers.
///
/// DIDs of other methods resolve only when an alias has been registered for
/// them, which is how a service's `did:web` identity maps to its key.
#[derive(Debug, Clone, Default)]
pub struct Ed25519KeyResolver {
    aliases: HashMap<Did, Ed25519Verifier>,
}

impl Ed25519KeyResolver {
    /// A resolver that only understands `did:key`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `did` as an alias for `key`.
    #[must_use]
    pub fn with_alias(mut self, did: Did, key: Ed25519Verifier) -> Self {
        self.aliases.insert(did, key);
        self
    }
}

impl Resolver for Ed25519KeyResolver {
    type Error = Ed25519ResolveError;

    async fn resolve(&self, did: &Did) -> Result<impl Verifier, Self::Error> {
        if let Some(key) = self.aliases.get(did) {
            return Ok(*key);
        }
        if did.method() != "key" {
            tracing::debug!(%did, "no verifier for non did:key principal");
            return Err(Ed25519ResolveError::Unresolvable(did.clone()));
        }
        Ok(did.as_str().parse::<Ed25519Verifier>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Absentee, Ed25519Signer};
    use mandate_varsig::{Principal, Signer};
    use testresult::TestResult;

    #[tokio::test]
    async fn it_resolves_did_keys() -> TestResult {
        let signer = Ed25519Signer::import(&[9; 32])?;
        let signature = signer.sign(b"hello").await?;

        let did = signer.did();
        let resolver = Ed25519KeyResolver::new();
        let verifier = resolver.resolve(&did).await?;
        verifier.verify(b"hello", &signature).await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_resolves_registered_aliases() -> TestResult {
        let key = Ed25519Signer::import(&[4; 32])?;
        let service = key.clone().with_did("did:web:upload.example".parse()?);
        let did = service.did();
        let resolver = Ed25519KeyResolver::new().with_alias(did.clone(), *key.verifier());

        let signature = service.sign(b"attest").await?;
        let verifier = resolver.resolve(&did).await?;
        verifier.verify(b"attest", &signature).await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_cannot_resolve_absentees() -> TestResult {
        let account = Absentee::from_email("alice@example.com")?;
        let did = account.did();
        let resolver = Ed25519KeyResolver::new();
        let result = resolver.resolve(&did).await;
        assert!(matches!(result, Err(Ed25519ResolveError::Unresolvable(_))));
        Ok(())
    }
}
