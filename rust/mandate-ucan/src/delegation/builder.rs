//! Type-state builder for [`Delegation`]s.

use std::time::Duration;

use mandate_varsig::{Did, Principal};
use thiserror::Error;

use super::{
    Delegation, DelegationError, Proof,
    payload::{Fact, SignedPayload, Ucan, VERSION},
};
use crate::{
    block::{Blocks, EncodeError, to_dagcbor_block},
    capability::{Capability, Failure},
    issuer::Issuer,
    sealed::{DidOrUnset, IssuerOrUnset},
    time::{TimeRange, Timestamp},
    unset::Unset,
};

/// Builds and signs a [`Delegation`].
///
/// The issuer and audience are tracked in the type so that
/// [`try_build`](DelegationBuilder::try_build) is only callable once both
/// are set. Expiration defaults to none.
#[derive(Debug, Clone)]
pub struct DelegationBuilder<I: IssuerOrUnset = Unset, A: DidOrUnset = Unset> {
    issuer: I,
    audience: A,
    capabilities: Vec<Capability>,
    proofs: Vec<Proof>,
    expiration: Option<Timestamp>,
    not_before: Option<Timestamp>,
    facts: Vec<Fact>,
    nonce: Option<String>,
}

impl Default for DelegationBuilder<Unset, Unset> {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegationBuilder<Unset, Unset> {
    /// Creates a blank builder.
    #[must_use]
    pub const fn new() -> Self {
        DelegationBuilder {
            issuer: Unset,
            audience: Unset,
            capabilities: Vec::new(),
            proofs: Vec::new(),
            expiration: None,
            not_before: None,
            facts: Vec::new(),
            nonce: None,
        }
    }
}

impl<I: IssuerOrUnset, A: DidOrUnset> DelegationBuilder<I, A> {
    /// Sets the signing issuer.
    pub fn issuer<NewI: Issuer>(self, issuer: NewI) -> DelegationBuilder<NewI, A> {
        DelegationBuilder {
            issuer,
            audience: self.audience,
            capabilities: self.capabilities,
            proofs: self.proofs,
            expiration: self.expiration,
            not_before: self.not_before,
            facts: self.facts,
            nonce: self.nonce,
        }
    }

    /// Sets the audience.
    pub fn audience<P: Principal + ?Sized>(self, audience: &P) -> DelegationBuilder<I, Did> {
        DelegationBuilder {
            issuer: self.issuer,
            audience: audience.did(),
            capabilities: self.capabilities,
            proofs: self.proofs,
            expiration: self.expiration,
            not_before: self.not_before,
            facts: self.facts,
            nonce: self.nonce,
        }
    }

    /// Appends a capability.
    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Appends several capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// Appends a proof, either an inline delegation or a bare CID.
    #[must_use]
    pub fn proof(mut self, proof: impl Into<Proof>) -> Self {
        self.proofs.push(proof.into());
        self
    }

    /// Appends several proofs.
    #[must_use]
    pub fn proofs<P: Into<Proof>>(mut self, proofs: impl IntoIterator<Item = P>) -> Self {
        self.proofs.extend(proofs.into_iter().map(Into::into));
        self
    }

    /// Sets the expiration.
    #[must_use]
    pub fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Expires `lifetime` from now.
    #[must_use]
    pub fn lifetime(self, lifetime: Duration) -> Self {
        self.expiration(Timestamp::now() + lifetime)
    }

    /// Sets the not-before time.
    #[must_use]
    pub fn not_before(mut self, not_before: Timestamp) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Appends a fact.
    #[must_use]
    pub fn fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    /// Sets the nonce.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

impl<I: Issuer> DelegationBuilder<I, Did> {
    /// Validates, signs and encodes the delegation.
    ///
    /// Inline proofs and everything they carry become the attached blocks of
    /// the result.
    ///
    /// # Errors
    ///
    /// Fails when no capabilities were given, a capability is malformed, the
    /// validity window is empty, or signing fails.
    pub async fn try_build(self) -> Result<Delegation, BuildError> {
        if self.capabilities.is_empty() {
            return Err(BuildError::NoCapabilities);
        }
        for capability in &self.capabilities {
            capability.validate()?;
        }
        if !TimeRange::new(self.not_before, self.expiration).is_valid() {
            return Err(BuildError::InvalidTimeRange {
                not_before: self.not_before,
                expiration: self.expiration,
            });
        }

        let issuer = self.issuer.did();
        let proofs: Vec<_> = self.proofs.iter().map(Proof::cid).collect();
        let payload = SignedPayload {
            version: VERSION,
            issuer: &issuer,
            audience: &self.audience,
            capabilities: &self.capabilities,
            expiration: self.expiration,
            not_before: self.not_before,
            nonce: self.nonce.as_deref(),
            facts: &self.facts,
            proofs: &proofs,
        }
        .encode()?;

        let signature = self.issuer.sign(&payload).await?;

        let mut attached = Blocks::new();
        for proof in self.proofs.iter().filter_map(Proof::as_delegation) {
            for block in proof.export()? {
                attached.entry(*block.cid()).or_insert(block);
            }
        }

        let ucan = Ucan {
            version: VERSION.to_owned(),
            issuer,
            audience: self.audience,
            capabilities: self.capabilities,
            expiration: self.expiration,
            not_before: self.not_before,
            nonce: self.nonce,
            facts: self.facts,
            proofs,
            signature,
        };
        let block = to_dagcbor_block(&ucan)?;
        tracing::trace!(cid = %block.cid(), iss = %ucan.issuer, aud = %ucan.audience, "delegation issued");

        Ok(Delegation::from_parts(block, ucan, attached))
    }
}

/// Errors from [`DelegationBuilder::try_build`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// A delegation must grant at least one capability.
    #[error("a delegation needs at least one capability")]
    NoCapabilities,

    /// A capability failed validation.
    #[error(transparent)]
    Capability(#[from] Failure),

    /// `not_before` is not strictly before `expiration`.
    #[error("expiration {expiration:?} must be after not-before {not_before:?}")]
    InvalidTimeRange {
        /// Requested not-before.
        not_before: Option<Timestamp>,
        /// Requested expiration.
        expiration: Option<Timestamp>,
    },

    /// Encoding the token failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// An inline proof could not be exported.
    #[error(transparent)]
    Proof(#[from] DelegationError),

    /// The issuer failed to sign.
    #[error("signing failed: {0}")]
    Signature(#[from] signature::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandate_credentials::Ed25519Signer;
    use testresult::TestResult;

    fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).unwrap()
    }

    #[tokio::test]
    async fn it_requires_a_capability() {
        let alice = test_signer(1);
        let result = DelegationBuilder::new()
            .issuer(alice.clone())
            .audience(&alice)
            .try_build()
            .await;
        assert!(matches!(result, Err(BuildError::NoCapabilities)));
    }

    #[tokio::test]
    async fn it_requires_expiration_after_not_before() {
        let alice = test_signer(1);
        let result = DelegationBuilder::new()
            .issuer(alice.clone())
            .audience(&alice)
            .capability(Capability::new("*", alice.did().as_str()))
            .not_before(Timestamp::from_unix(100))
            .expiration(Timestamp::from_unix(100))
            .try_build()
            .await;
        assert!(matches!(result, Err(BuildError::InvalidTimeRange { .. })));
    }

    #[tokio::test]
    async fn it_rejects_malformed_capabilities() {
        let alice = test_signer(1);
        let result = DelegationBuilder::new()
            .issuer(alice.clone())
            .audience(&alice)
            .capability(Capability::new("store/add", "https://example.com"))
            .try_build()
            .await;
        assert!(matches!(result, Err(BuildError::Capability(_))));
    }

    #[tokio::test]
    async fn it_defaults_to_no_expiration() -> TestResult {
        let alice = test_signer(1);
        let delegation = DelegationBuilder::new()
            .issuer(alice.clone())
            .audience(&alice)
            .capability(Capability::new("*", alice.did().as_str()))
            .try_build()
            .await?;
        assert_eq!(delegation.expiration(), None);
        assert!(delegation.attached().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_attaches_the_blocks_of_inline_proofs() -> TestResult {
        let space = test_signer(1);
        let alice = test_signer(2);
        let bob = test_signer(3);

        let root = DelegationBuilder::new()
            .issuer(space.clone())
            .audience(&alice)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let leaf = DelegationBuilder::new()
            .issuer(alice)
            .audience(&bob)
            .capability(Capability::new("store/*", space.did().as_str()))
            .lifetime(Duration::from_secs(60))
            .proof(root.clone())
            .try_build()
            .await?;

        assert!(leaf.attached().contains_key(root.cid()));
        assert_eq!(leaf.proof_links(), &[*root.cid()]);
        assert!(leaf.expiration().is_some());
        Ok(())
    }
}
