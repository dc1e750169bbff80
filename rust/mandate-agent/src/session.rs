//! Session attestation.
//!
//! An absentee account (a `did:mailto` principal with no key) delegates to
//! an agent with an empty signature. Such a delegation only becomes usable
//! when a trusted service issues a `ucan/attest` delegation whose
//! `nb.proof` links to it. This module indexes those attestations and
//! resolves attested delegations into session roots.

use indexmap::IndexMap;
use ipld_core::{cid::Cid, ipld::Ipld};
use mandate_ucan::{
    Delegation, Timestamp,
    delegation::{BuildError, DelegationError},
};
use mandate_varsig::{Did, Resolver};
use thiserror::Error;

use crate::{StorageError, store::DelegationStore};

/// Ability of an attestation.
pub const ATTEST: &str = "ucan/attest";

/// Errors from session resolution and the access service.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The attested delegation is not stored.
    #[error("Delegation {0} not found")]
    DelegationNotFound(Cid),

    /// The attested delegation grants nothing on `ucan:*`.
    #[error("Delegation {0} is not a session delegation")]
    NotASession(Cid),

    /// Issuing a session pair failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A stored delegation could not be read.
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// Persisting the service state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Attestations by attested CID, then by attesting issuer.
///
/// Lists are appended to, never replaced, so several issuers (and several
/// attestations by the same issuer) are all kept.
#[derive(Debug, Clone, Default)]
pub struct SessionIndex {
    entries: IndexMap<Cid, IndexMap<Did, Vec<Delegation>>>,
}

impl SessionIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `attestation` as vouching for `proof`.
    pub fn insert(&mut self, proof: Cid, attestation: Delegation) {
        self.entries
            .entry(proof)
            .or_default()
            .entry(attestation.issuer().clone())
            .or_default()
            .push(attestation);
    }

    /// Every attestation of `proof`, grouped by issuer in first-seen order.
    pub fn attestations<'a>(&'a self, proof: &Cid) -> impl Iterator<Item = &'a Delegation> + 'a {
        self.entries
            .get(proof)
            .into_iter()
            .flat_map(|by_issuer| by_issuer.values().flatten())
    }

    /// Attestations of `proof` issued by `issuer`.
    pub fn attested_by(&self, proof: &Cid, issuer: &Did) -> &[Delegation] {
        self.entries
            .get(proof)
            .and_then(|by_issuer| by_issuer.get(issuer))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Issuers that attested `proof`.
    pub fn issuers<'a>(&'a self, proof: &Cid) -> impl Iterator<Item = &'a Did> + 'a {
        self.entries
            .get(proof)
            .into_iter()
            .flat_map(|by_issuer| by_issuer.keys())
    }

    /// Whether anything attests `proof`.
    pub fn contains(&self, proof: &Cid) -> bool {
        self.entries.contains_key(proof)
    }

    /// Number of attested delegations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The CID `delegation` attests, if it carries a `ucan/attest` capability.
pub fn attestation_target(delegation: &Delegation) -> Option<Cid> {
    attested(delegation, |_| true)
}

/// The CID `delegation` attests on behalf of `service`.
///
/// A `did:web` service signs with keys of its own, so any issuer may attest
/// on its behalf and the signature is checked separately. Any other service
/// must issue the attestation itself.
fn attested_by_service(delegation: &Delegation, service: &Did) -> Option<Cid> {
    if service.method() != "web" && delegation.issuer() != service {
        return None;
    }
    attested(delegation, |with| with == service.as_str())
}

fn attested(delegation: &Delegation, accept: impl Fn(&str) -> bool) -> Option<Cid> {
    delegation
        .capabilities()
        .iter()
        .filter(|capability| capability.can == ATTEST && accept(&capability.with))
        .find_map(|capability| match capability.nb.get("proof") {
            Some(Ipld::Link(cid)) => Some(*cid),
            _ => None,
        })
}

/// Indexes every stored attestation issued on `service`.
///
/// Attestations outside their validity window at `now`, or whose signature
/// does not verify through `resolver`, are skipped.
pub async fn scan_attestations<R>(
    store: &DelegationStore,
    service: &Did,
    resolver: &R,
    now: Timestamp,
) -> SessionIndex
where
    R: Resolver,
{
    let mut index = SessionIndex::new();
    for delegation in store.iter() {
        let Some(proof) = attested_by_service(delegation, service) else {
            continue;
        };
        if let Err(error) = delegation.time_range().check(now) {
            tracing::debug!(cid = %delegation.cid(), %error, "skipping attestation");
            continue;
        }
        if let Err(error) = delegation.verify_signature(resolver).await {
            tracing::warn!(cid = %delegation.cid(), %error, "attestation signature rejected");
            continue;
        }
        tracing::trace!(cid = %delegation.cid(), %proof, iss = %delegation.issuer(), "indexed attestation");
        index.insert(proof, delegation.clone());
    }
    index
}

/// Loads the attested delegation `attested` as a session root.
///
/// # Errors
///
/// Fails when the delegation is not stored or has no capability on the
/// `ucan:*` session resource.
pub fn resolve_session(store: &DelegationStore, attested: &Cid) -> Result<Delegation, SessionError> {
    let delegation = store
        .get(attested)
        .ok_or(SessionError::DelegationNotFound(*attested))?;
    if delegation
        .capabilities()
        .iter()
        .any(|capability| capability.is_session())
    {
        Ok(delegation.clone())
    } else {
        Err(SessionError::NotASession(*attested))
    }
}

/// Whether `delegations` contain a delegation issued by `account` together
/// with an attestation of it by `service`.
pub fn has_attested_session(delegations: &[Delegation], account: &Did, service: &Did) -> bool {
    delegations
        .iter()
        .filter_map(|delegation| attested_by_service(delegation, service))
        .any(|target| {
            delegations
                .iter()
                .any(|delegation| delegation.cid() == &target && delegation.issuer() == account)
        })
}
