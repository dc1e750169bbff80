//! UCAN delegations.
//!
//! A [`Delegation`] is a signed, content-addressed grant of capabilities
//! from an issuer to an audience. It is backed by its own dag-cbor block and
//! shares a pool of attached blocks with every delegation decoded from the
//! same bundle; proofs are looked up in that pool by CID, and a proof whose
//! block is not attached is exposed as a bare [`Proof::Link`].

pub mod builder;
mod payload;

use std::{fmt, sync::Arc};

use ipld_core::cid::Cid;
use mandate_varsig::{Did, Resolver, Signature, Verifier};
use thiserror::Error;

pub use builder::{BuildError, DelegationBuilder};
pub use payload::{Fact, Ucan, VERSION};

use crate::{
    block::{Block, Blocks, EncodeError},
    capability::Capability,
    time::{TimeRange, Timestamp},
    unset::Unset,
};

/// A signed grant of capabilities.
///
/// Cloning is cheap: the token, its block and the attached pool are shared.
#[derive(Clone)]
pub struct Delegation {
    block: Block,
    ucan: Arc<Ucan>,
    attached: Arc<Blocks>,
}

/// A proof referenced by a delegation.
#[derive(Debug, Clone, PartialEq)]
pub enum Proof {
    /// The proof's block is attached and decoded.
    Delegation(Delegation),
    /// Only the proof's CID is known.
    Link(Cid),
}

impl Proof {
    /// CID of the proof.
    pub fn cid(&self) -> Cid {
        match self {
            Proof::Delegation(delegation) => *delegation.cid(),
            Proof::Link(cid) => *cid,
        }
    }

    /// The decoded proof, if its block was attached.
    pub fn as_delegation(&self) -> Option<&Delegation> {
        match self {
            Proof::Delegation(delegation) => Some(delegation),
            Proof::Link(_) => None,
        }
    }
}

impl From<Delegation> for Proof {
    fn from(delegation: Delegation) -> Self {
        Proof::Delegation(delegation)
    }
}

impl From<Cid> for Proof {
    fn from(cid: Cid) -> Self {
        Proof::Link(cid)
    }
}

/// Errors reading a delegation from a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    /// The block is not a well-formed token.
    #[error("block {cid} is not a valid delegation: {reason}")]
    Decode {
        /// CID of the offending block.
        cid: Cid,
        /// Decoder message.
        reason: String,
    },

    /// The token grants nothing.
    #[error("delegation {0} has no capabilities")]
    NoCapabilities(Cid),

    /// Re-encoding the signed payload failed.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Error type for delegation signature verification.
#[derive(Debug, Error)]
pub enum SignatureVerificationError<E: std::error::Error = signature::Error> {
    /// Payload encoding failed.
    #[error("encoding error: {0}")]
    EncodingError(EncodeError),

    /// DID resolution failed.
    #[error("resolution error: {0}")]
    ResolutionError(E),

    /// Cryptographic verification failed.
    #[error("verification error: {0}")]
    VerificationError(signature::Error),
}

impl Delegation {
    /// Creates a blank [`DelegationBuilder`].
    #[must_use]
    pub const fn builder() -> DelegationBuilder<Unset, Unset> {
        DelegationBuilder::new()
    }

    /// Decodes a delegation from its block, resolving proofs through `attached`.
    ///
    /// # Errors
    ///
    /// Fails when the block is not a token or grants no capabilities.
    pub fn from_block(block: Block, attached: Arc<Blocks>) -> Result<Self, DelegationError> {
        let ucan: Ucan =
            serde_ipld_dagcbor::from_slice(block.bytes()).map_err(|error| DelegationError::Decode {
                cid: *block.cid(),
                reason: error.to_string(),
            })?;
        if ucan.capabilities.is_empty() {
            return Err(DelegationError::NoCapabilities(*block.cid()));
        }
        Ok(Self {
            block,
            ucan: Arc::new(ucan),
            attached,
        })
    }

    /// Decodes a standalone delegation with no attached proofs.
    pub fn decode(bytes: &[u8]) -> Result<Self, DelegationError> {
        Self::from_block(Block::new(bytes.to_vec()), Arc::default())
    }

    pub(crate) fn from_parts(block: Block, ucan: Ucan, attached: Blocks) -> Self {
        Self {
            block,
            ucan: Arc::new(ucan),
            attached: Arc::new(attached),
        }
    }

    /// CID of this delegation's block.
    pub fn cid(&self) -> &Cid {
        self.block.cid()
    }

    /// This delegation's own block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The decoded token.
    pub fn ucan(&self) -> &Ucan {
        &self.ucan
    }

    /// Blocks travelling with this delegation.
    pub fn attached(&self) -> &Arc<Blocks> {
        &self.attached
    }

    /// Getter for the `issuer` field.
    pub fn issuer(&self) -> &Did {
        &self.ucan.issuer
    }

    /// Getter for the `audience` field.
    pub fn audience(&self) -> &Did {
        &self.ucan.audience
    }

    /// Getter for the `capabilities` field. Never empty.
    pub fn capabilities(&self) -> &[Capability] {
        &self.ucan.capabilities
    }

    /// Getter for the `expiration` field.
    pub fn expiration(&self) -> Option<Timestamp> {
        self.ucan.expiration
    }

    /// Getter for the `not_before` field.
    pub fn not_before(&self) -> Option<Timestamp> {
        self.ucan.not_before
    }

    /// Getter for the `nonce` field.
    pub fn nonce(&self) -> Option<&str> {
        self.ucan.nonce.as_deref()
    }

    /// Getter for the `facts` field.
    pub fn facts(&self) -> &[Fact] {
        &self.ucan.facts
    }

    /// Getter for the `signature` field.
    pub fn signature(&self) -> &Signature {
        &self.ucan.signature
    }

    /// CIDs of every proof, attached or not.
    pub fn proof_links(&self) -> &[Cid] {
        &self.ucan.proofs
    }

    /// The validity window of this delegation.
    pub fn time_range(&self) -> TimeRange {
        TimeRange::from(self)
    }

    /// Resolves proofs through the attached pool.
    ///
    /// # Errors
    ///
    /// Fails if an attached proof block cannot be decoded.
    pub fn proofs(&self) -> Result<Vec<Proof>, DelegationError> {
        self.ucan
            .proofs
            .iter()
            .map(|cid| match self.attached.get(cid) {
                Some(block) => {
                    Delegation::from_block(block.clone(), self.attached.clone()).map(Proof::from)
                }
                None => Ok(Proof::Link(*cid)),
            })
            .collect()
    }

    /// Blocks of every attached proof, depth first, followed by this block.
    ///
    /// Bare-link proofs contribute nothing. Proofs reachable along several
    /// paths are emitted once per path.
    ///
    /// # Errors
    ///
    /// Fails if an attached proof block cannot be decoded.
    pub fn export(&self) -> Result<Vec<Block>, DelegationError> {
        let mut blocks = Vec::new();
        for proof in self.proofs()? {
            if let Proof::Delegation(proof) = proof {
                blocks.extend(proof.export()?);
            }
        }
        blocks.push(self.block.clone());
        Ok(blocks)
    }

    /// The capabilities this delegation effectively grants.
    ///
    /// Capabilities on the `ucan:*` session resource are replaced by what the
    /// attached proofs addressed to the issuer grant.
    ///
    /// # Errors
    ///
    /// Fails if an attached proof block cannot be decoded.
    pub fn allows(&self) -> Result<Vec<Capability>, DelegationError> {
        let proofs: Vec<Delegation> = self
            .proofs()?
            .into_iter()
            .filter_map(|proof| match proof {
                Proof::Delegation(delegation) => Some(delegation),
                Proof::Link(_) => None,
            })
            .collect();
        self.allows_through(&proofs)
    }

    /// Like [`Delegation::allows`], expanding session capabilities through
    /// the given `proofs` instead of the attached ones.
    ///
    /// # Errors
    ///
    /// Fails if a proof's own attached blocks cannot be decoded.
    pub fn allows_through(&self, proofs: &[Delegation]) -> Result<Vec<Capability>, DelegationError> {
        let mut allowed = Vec::new();
        for capability in self.capabilities() {
            if !capability.is_session() {
                allowed.push(capability.clone());
                continue;
            }
            for proof in proofs.iter().filter(|proof| proof.audience() == self.issuer()) {
                for granted in proof.allows()? {
                    if let Some(narrowed) = capability.narrow(&granted) {
                        allowed.push(narrowed);
                    }
                }
            }
        }
        Ok(allowed)
    }

    /// Verify only the signature of this delegation using a resolver.
    ///
    /// The resolver resolves the issuer DID to a verifier, then verifies
    /// the signature.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureVerificationError`] if signature verification fails.
    pub async fn verify_signature<R>(
        &self,
        resolver: &R,
    ) -> Result<(), SignatureVerificationError<R::Error>>
    where
        R: Resolver,
    {
        let payload = self
            .ucan
            .payload()
            .encode()
            .map_err(SignatureVerificationError::EncodingError)?;
        let verifier = resolver
            .resolve(self.issuer())
            .await
            .map_err(SignatureVerificationError::ResolutionError)?;
        Verifier::verify(&verifier, &payload, self.signature())
            .await
            .map_err(SignatureVerificationError::VerificationError)
    }
}

impl PartialEq for Delegation {
    fn eq(&self, other: &Self) -> bool {
        self.cid() == other.cid()
    }
}

impl Eq for Delegation {}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("cid", &self.cid().to_string())
            .field("iss", self.issuer())
            .field("aud", self.audience())
            .field("att", &self.capabilities())
            .field("exp", &self.expiration())
            .finish()
    }
}

impl From<&Delegation> for TimeRange {
    fn from(delegation: &Delegation) -> Self {
        Self::new(delegation.not_before(), delegation.expiration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SESSION_RESOURCE;
    use mandate_credentials::{Absentee, Ed25519KeyResolver, Ed25519Signer};
    use mandate_varsig::Principal;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).unwrap()
    }

    #[tokio::test]
    async fn it_round_trips_through_its_block() -> TestResult {
        let alice = test_signer(1);
        let bob = test_signer(2);

        let delegation = Delegation::builder()
            .issuer(alice.clone())
            .audience(&bob)
            .capability(Capability::new("store/add", alice.did().as_str()))
            .expiration(Timestamp::from_unix(2_000_000_000))
            .nonce("n1")
            .try_build()
            .await?;

        let decoded = Delegation::decode(delegation.block().bytes())?;
        assert_eq!(decoded.cid(), delegation.cid());
        assert_eq!(decoded.issuer(), &alice.did());
        assert_eq!(decoded.audience(), &bob.did());
        assert_eq!(decoded.nonce(), Some("n1"));
        assert_eq!(decoded.ucan().version, VERSION);
        decoded.verify_signature(&Ed25519KeyResolver::new()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_derives_equal_cids_for_equal_tokens() -> TestResult {
        let alice = test_signer(1);
        let build = || {
            Delegation::builder()
                .issuer(alice.clone())
                .audience(&alice)
                .capability(Capability::new("*", alice.did().as_str()))
                .try_build()
        };
        assert_eq!(build().await?.cid(), build().await?.cid());
        Ok(())
    }

    #[tokio::test]
    async fn it_detects_tampered_signatures() -> TestResult {
        let alice = test_signer(1);
        let mallory = test_signer(9);

        let delegation = Delegation::builder()
            .issuer(mallory)
            .audience(&alice)
            .capability(Capability::new("*", alice.did().as_str()))
            .try_build()
            .await?;

        let mut forged = delegation.ucan().clone();
        forged.issuer = alice.did();
        let block = crate::block::to_dagcbor_block(&forged)?;
        let forged = Delegation::from_block(block, Arc::default())?;

        assert!(
            forged
                .verify_signature(&Ed25519KeyResolver::new())
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_exports_proofs_before_itself() -> TestResult {
        let space = test_signer(1);
        let alice = test_signer(2);
        let bob = test_signer(3);

        let root = Delegation::builder()
            .issuer(space.clone())
            .audience(&alice)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let missing = crate::block::cid_of(b"not attached");
        let leaf = Delegation::builder()
            .issuer(alice)
            .audience(&bob)
            .capability(Capability::new("store/add", space.did().as_str()))
            .proof(root.clone())
            .proof(missing)
            .try_build()
            .await?;

        let cids: Vec<Cid> = leaf.export()?.iter().map(|block| *block.cid()).collect();
        assert_eq!(cids, vec![*root.cid(), *leaf.cid()]);

        let proofs = leaf.proofs()?;
        assert_eq!(proofs[0], Proof::Delegation(root));
        assert_eq!(proofs[1], Proof::Link(missing));
        Ok(())
    }

    #[tokio::test]
    async fn it_expands_session_capabilities_through_proofs() -> TestResult {
        let space = test_signer(1);
        let agent = test_signer(2);
        let account = Absentee::from_email("alice@example.com")?;

        let to_account = Delegation::builder()
            .issuer(space.clone())
            .audience(&account)
            .capability(Capability::new("store/*", space.did().as_str()))
            .try_build()
            .await?;
        let session = Delegation::builder()
            .issuer(account)
            .audience(&agent)
            .capability(Capability::new("*", SESSION_RESOURCE))
            .proof(to_account)
            .try_build()
            .await?;

        assert_eq!(
            session.allows()?,
            vec![Capability::new("store/*", space.did().as_str())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_tokens_without_capabilities() -> TestResult {
        let alice = test_signer(1);
        let delegation = Delegation::builder()
            .issuer(alice.clone())
            .audience(&alice)
            .capability(Capability::new("*", alice.did().as_str()))
            .try_build()
            .await?;

        let mut empty = delegation.ucan().clone();
        empty.capabilities.clear();
        let block = crate::block::to_dagcbor_block(&empty)?;
        let cid = *block.cid();
        assert_eq!(
            Delegation::from_block(block, Arc::default()),
            Err(DelegationError::NoCapabilities(cid))
        );
        Ok(())
    }
}
