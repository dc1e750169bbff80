//! Local presence check for revoked delegations.
//!
//! A `ucan/revoke` invocation names the delegation it revokes by CID in
//! `nb.ucan`. The revoked delegation must travel with the invocation so the
//! service can inspect it; nothing is looked up elsewhere and nothing is
//! mutated.

use ipld_core::{cid::Cid, ipld::Ipld};
use thiserror::Error;

use crate::{
    block::Blocks,
    capability::CapabilityKind,
    delegation::{Delegation, DelegationError},
};

/// Errors from [`check_revocation`] and [`revoked_delegations`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevocationError {
    /// The revoked delegation is not among the invocation's blocks.
    #[error("UCAN {0} not found in invocation")]
    UcanNotFound(Cid),

    /// A `ucan/revoke` capability does not link the revoked delegation.
    #[error("ucan/revoke capability is missing nb.ucan")]
    MissingTarget,

    /// The attached block does not decode as a delegation.
    #[error(transparent)]
    Delegation(#[from] DelegationError),
}

/// Succeeds only if a block with CID `target` is among `invocation_blocks`.
///
/// # Errors
///
/// Returns [`RevocationError::UcanNotFound`] otherwise.
pub fn check_revocation(target: &Cid, invocation_blocks: &Blocks) -> Result<(), RevocationError> {
    if invocation_blocks.contains_key(target) {
        Ok(())
    } else {
        tracing::debug!(%target, "revoked delegation is not attached");
        Err(RevocationError::UcanNotFound(*target))
    }
}

/// Collects the delegations revoked by every `ucan/revoke` capability of
/// `invocation`, checking that each is attached.
///
/// # Errors
///
/// Fails if a target is missing from the attached blocks, a capability
/// does not name its target, or an attached block does not decode.
pub fn revoked_delegations(invocation: &Delegation) -> Result<Vec<Delegation>, RevocationError> {
    let attached = invocation.attached();
    let mut revoked = Vec::new();
    for capability in invocation.capabilities() {
        if capability.kind().ok() != Some(CapabilityKind::UcanRevoke) {
            continue;
        }
        let Some(Ipld::Link(target)) = capability.nb.get("ucan") else {
            return Err(RevocationError::MissingTarget);
        };
        check_revocation(target, attached)?;
        if let Some(block) = attached.get(target) {
            revoked.push(Delegation::from_block(block.clone(), attached.clone())?);
        }
    }
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use mandate_credentials::Ed25519Signer;
    use mandate_varsig::Principal;
    use testresult::TestResult;

    #[tokio::test]
    async fn it_finds_attached_revocation_targets() -> TestResult {
        let space = Ed25519Signer::import(&[1; 32])?;
        let alice = Ed25519Signer::import(&[2; 32])?;

        let grant = Delegation::builder()
            .issuer(space.clone())
            .audience(&alice)
            .capability(Capability::new("store/*", space.did().as_str()))
            .try_build()
            .await?;

        let revoke = Delegation::builder()
            .issuer(space.clone())
            .audience(&space)
            .capability(
                Capability::new("ucan/revoke", space.did().as_str()).with_nb("ucan", *grant.cid()),
            )
            .proof(grant.clone())
            .try_build()
            .await?;

        check_revocation(grant.cid(), revoke.attached())?;
        assert_eq!(revoked_delegations(&revoke)?, vec![grant]);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_targets_that_are_not_attached() -> TestResult {
        let space = Ed25519Signer::import(&[1; 32])?;
        let target = crate::block::cid_of(b"somewhere else");

        let revoke = Delegation::builder()
            .issuer(space.clone())
            .audience(&space)
            .capability(
                Capability::new("ucan/revoke", space.did().as_str()).with_nb("ucan", target),
            )
            .try_build()
            .await?;

        assert_eq!(
            check_revocation(&target, revoke.attached()),
            Err(RevocationError::UcanNotFound(target))
        );
        assert_eq!(
            revoked_delegations(&revoke),
            Err(RevocationError::UcanNotFound(target))
        );
        Ok(())
    }
}
