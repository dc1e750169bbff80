//! Proof selection.
//!
//! Given the capabilities an agent wants to invoke, [`resolve_proofs`] walks
//! the delegations stored for the agent and returns every one that validly
//! grants them, together with whatever else must travel with it: proofs
//! that were only linked and had to be fetched from the store, and session
//! attestations.

use indexmap::IndexMap;
use ipld_core::cid::Cid;
use mandate_ucan::{
    Capability, Delegation, Failure, Proof, Timestamp, delegation::DelegationError, derives,
    time::TimeBoundError,
};
use mandate_varsig::Did;
use thiserror::Error;

use crate::{session::SessionIndex, store::DelegationStore};

/// Why a stored delegation was not selected for a capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    /// The delegation or one of its proofs has expired.
    #[error("Delegation {cid} expired at {expiration}")]
    Expired {
        /// The expired delegation.
        cid: Cid,
        /// Its expiration.
        expiration: Timestamp,
    },

    /// The delegation or one of its proofs is not valid yet.
    #[error("Delegation {cid} is not valid before {not_before}")]
    TooEarly {
        /// The premature delegation.
        cid: Cid,
        /// Its not-before time.
        not_before: Timestamp,
    },

    /// A proof was linked but is neither attached nor stored.
    #[error("Delegation {0} not found")]
    DelegationNotFound(Cid),

    /// None of the delegation's capabilities derive the claimed one.
    #[error("Delegation {cid} does not grant the capability ({} failures)", failures.len())]
    NotDerivable {
        /// The delegation.
        cid: Cid,
        /// One failure per granted capability.
        failures: Vec<Failure>,
    },

    /// A proof is not addressed to the issuer of the delegation citing it.
    #[error("Proof {proof} is addressed to {audience}, expected {issuer}")]
    Discontinuity {
        /// The proof.
        proof: Cid,
        /// Its audience.
        audience: Did,
        /// The issuer it should have been addressed to.
        issuer: Did,
    },

    /// The chain ends at a delegation whose issuer does not own the resource.
    #[error("Delegation {cid} from {issuer} cites no proof of ownership")]
    Unrooted {
        /// The last delegation of the chain.
        cid: Cid,
        /// Its issuer.
        issuer: Did,
    },

    /// An attached proof block could not be decoded.
    #[error(transparent)]
    Unreadable(#[from] DelegationError),
}

impl Rejection {
    fn unrooted(delegation: &Delegation) -> Self {
        Rejection::Unrooted {
            cid: *delegation.cid(),
            issuer: delegation.issuer().clone(),
        }
    }
}

/// Errors from [`resolve_proofs`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// No stored delegation grants `ability` on `resource`.
    #[error("No proofs available for {ability} on {resource}")]
    NoProofsAvailable {
        /// The requested resource.
        resource: String,
        /// The requested ability.
        ability: String,
        /// Why each candidate was rejected.
        reasons: Vec<Rejection>,
    },
}

/// Everything proof selection depends on besides the store.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    agent: Did,
    now: Timestamp,
    sessions: SessionIndex,
}

impl ResolutionContext {
    /// Selects proofs for `agent` as of `now`, without session attestations.
    pub fn new(agent: Did, now: Timestamp) -> Self {
        Self {
            agent,
            now,
            sessions: SessionIndex::new(),
        }
    }

    /// Attaches a session index whose attestations accompany the
    /// delegations they attest.
    pub fn with_sessions(mut self, sessions: SessionIndex) -> Self {
        self.sessions = sessions;
        self
    }

    /// The agent proofs are selected for.
    pub fn agent(&self) -> &Did {
        &self.agent
    }

    /// The time validity windows are checked against.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// The session index.
    pub fn sessions(&self) -> &SessionIndex {
        &self.sessions
    }
}

/// Selects the delegations authorizing every capability in `query`.
///
/// All valid matches are returned, de-duplicated by CID in first-seen order.
/// Each accepted delegation is followed by the store-resolved proofs its
/// chain links to and by every attestation of it in the context's session
/// index. Capabilities on the agent's own DID need no proof.
///
/// # Errors
///
/// Fails with [`ResolutionError::NoProofsAvailable`] as soon as a query
/// entry has no match.
pub fn resolve_proofs(
    store: &DelegationStore,
    context: &ResolutionContext,
    query: &[Capability],
) -> Result<Vec<Delegation>, ResolutionError> {
    let selector = Selector { store, context };
    let mut selected: IndexMap<Cid, Delegation> = IndexMap::new();

    for claimed in query {
        if claimed.with == context.agent.as_str() {
            tracing::trace!(%claimed, "self-issued capability");
            continue;
        }

        let mut matched = false;
        let mut reasons = Vec::new();
        for candidate in store.issued_to(&context.agent) {
            match selector.select(candidate, claimed) {
                Ok(support) => {
                    tracing::debug!(cid = %candidate.cid(), %claimed, "proof accepted");
                    matched = true;
                    selected
                        .entry(*candidate.cid())
                        .or_insert_with(|| candidate.clone());
                    for delegation in support
                        .into_iter()
                        .chain(context.sessions.attestations(candidate.cid()).cloned())
                    {
                        selected.entry(*delegation.cid()).or_insert(delegation);
                    }
                }
                Err(rejection) => {
                    tracing::trace!(cid = %candidate.cid(), %claimed, %rejection, "proof rejected");
                    reasons.push(rejection);
                }
            }
        }

        if !matched {
            tracing::debug!(%claimed, rejected = reasons.len(), "no proofs available");
            return Err(ResolutionError::NoProofsAvailable {
                resource: claimed.with.clone(),
                ability: claimed.can.clone(),
                reasons,
            });
        }
    }

    Ok(selected.into_values().collect())
}

struct Selector<'a> {
    store: &'a DelegationStore,
    context: &'a ResolutionContext,
}

impl Selector<'_> {
    /// Accepts `candidate` for `claimed`, returning the proofs that had to be
    /// fetched from the store.
    fn select(&self, candidate: &Delegation, claimed: &Capability) -> Result<Vec<Delegation>, Rejection> {
        self.check_window(candidate)?;

        let mut fetched = Vec::new();
        let proofs = self.proofs_of(candidate, &mut fetched)?;

        let mut failures = Vec::new();
        let granted = candidate
            .allows_through(&proofs)?
            .iter()
            .any(|delegated| match derives(claimed, delegated) {
                Ok(()) => true,
                Err(failure) => {
                    failures.push(failure);
                    false
                }
            });
        if !granted {
            return Err(Rejection::NotDerivable {
                cid: *candidate.cid(),
                failures,
            });
        }

        if candidate.issuer().as_str() != claimed.with {
            if proofs.is_empty() {
                return Err(Rejection::unrooted(candidate));
            }
            for proof in &proofs {
                self.check_chain(proof, candidate.issuer(), claimed, &mut fetched)?;
            }
        }
        Ok(fetched)
    }

    /// Checks that `proof` continues a chain towards the owner of
    /// `claimed.with`.
    fn check_chain(
        &self,
        proof: &Delegation,
        issuer: &Did,
        claimed: &Capability,
        fetched: &mut Vec<Delegation>,
    ) -> Result<(), Rejection> {
        if proof.audience() != issuer {
            return Err(Rejection::Discontinuity {
                proof: *proof.cid(),
                audience: proof.audience().clone(),
                issuer: issuer.clone(),
            });
        }
        self.check_window(proof)?;
        if proof.issuer().as_str() == claimed.with {
            return Ok(());
        }
        let parents = self.proofs_of(proof, fetched)?;
        if parents.is_empty() {
            return Err(Rejection::unrooted(proof));
        }
        for parent in parents {
            self.check_chain(&parent, proof.issuer(), claimed, fetched)?;
        }
        Ok(())
    }

    /// Resolves the proofs of `delegation`, looking bare links up in the
    /// store. Store hits are recorded in `fetched`.
    fn proofs_of(
        &self,
        delegation: &Delegation,
        fetched: &mut Vec<Delegation>,
    ) -> Result<Vec<Delegation>, Rejection> {
        delegation
            .proofs()?
            .into_iter()
            .map(|proof| match proof {
                Proof::Delegation(proof) => Ok(proof),
                Proof::Link(cid) => {
                    let proof = self
                        .store
                        .get(&cid)
                        .cloned()
                        .ok_or(Rejection::DelegationNotFound(cid))?;
                    fetched.push(proof.clone());
                    Ok(proof)
                }
            })
            .collect()
    }

    fn check_window(&self, delegation: &Delegation) -> Result<(), Rejection> {
        delegation
            .time_range()
            .check(self.context.now)
            .map_err(|error| match error {
                TimeBoundError::Expired { expiration, .. } => Rejection::Expired {
                    cid: *delegation.cid(),
                    expiration,
                },
                TimeBoundError::TooEarly { not_before, .. } => Rejection::TooEarly {
                    cid: *delegation.cid(),
                    not_before,
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use mandate_credentials::{Absentee, Ed25519Signer};
    use mandate_varsig::Principal;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    use super::*;
    use crate::{data::DelegationMeta, session::ATTEST};

    const NOW: Timestamp = Timestamp::from_unix(1_700_000_000);

    fn signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::import(&[seed; 32]).unwrap()
    }

    fn store_of(delegations: &[&Delegation]) -> DelegationStore {
        let mut store = DelegationStore::new();
        for delegation in delegations {
            store.insert((*delegation).clone(), DelegationMeta::default());
        }
        store
    }

    fn rejections(error: ResolutionError) -> Vec<Rejection> {
        let ResolutionError::NoProofsAvailable { reasons, .. } = error;
        reasons
    }

    #[tokio::test]
    async fn it_selects_a_root_delegation_from_the_owner() -> TestResult {
        let space = signer(1);
        let agent = signer(2);
        let root = Delegation::builder()
            .issuer(space.clone())
            .audience(&agent)
            .capability(Capability::new("store/*", space.did().as_str()))
            .try_build()
            .await?;

        let store = store_of(&[&root]);
        let context = ResolutionContext::new(agent.did(), NOW);
        let query = [Capability::new("store/add", space.did().as_str())];

        assert_eq!(resolve_proofs(&store, &context, &query)?, vec![root]);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_expired_and_premature_delegations() -> TestResult {
        let space = signer(1);
        let agent = signer(2);
        let expired = Delegation::builder()
            .issuer(space.clone())
            .audience(&agent)
            .capability(Capability::new("*", space.did().as_str()))
            .expiration(NOW.saturating_sub(1))
            .try_build()
            .await?;
        let premature = Delegation::builder()
            .issuer(space.clone())
            .audience(&agent)
            .capability(Capability::new("*", space.did().as_str()))
            .not_before(Timestamp::from_unix(NOW.to_unix() + 60))
            .try_build()
            .await?;

        let store = store_of(&[&expired, &premature]);
        let context = ResolutionContext::new(agent.did(), NOW);
        let error = resolve_proofs(
            &store,
            &context,
            &[Capability::new("store/list", space.did().as_str())],
        )
        .unwrap_err();

        assert_eq!(
            rejections(error),
            vec![
                Rejection::Expired {
                    cid: *expired.cid(),
                    expiration: NOW.saturating_sub(1),
                },
                Rejection::TooEarly {
                    cid: *premature.cid(),
                    not_before: Timestamp::from_unix(NOW.to_unix() + 60),
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_fetches_linked_proofs_from_the_store() -> TestResult {
        let space = signer(1);
        let alice = signer(2);
        let agent = signer(3);
        let root = Delegation::builder()
            .issuer(space.clone())
            .audience(&alice)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let leaf = Delegation::builder()
            .issuer(alice)
            .audience(&agent)
            .capability(Capability::new("upload/add", space.did().as_str()))
            .proof(*root.cid())
            .try_build()
            .await?;
        let query = [Capability::new("upload/add", space.did().as_str())];
        let context = ResolutionContext::new(agent.did(), NOW);

        let error = resolve_proofs(&store_of(&[&leaf]), &context, &query).unwrap_err();
        assert_eq!(
            rejections(error),
            vec![Rejection::DelegationNotFound(*root.cid())]
        );

        let resolved = resolve_proofs(&store_of(&[&leaf, &root]), &context, &query)?;
        assert_eq!(resolved, vec![leaf, root]);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_broken_chains() -> TestResult {
        let space = signer(1);
        let alice = signer(2);
        let mallory = signer(3);
        let agent = signer(4);
        let to_alice = Delegation::builder()
            .issuer(space.clone())
            .audience(&alice)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let forged = Delegation::builder()
            .issuer(mallory.clone())
            .audience(&agent)
            .capability(Capability::new("store/add", space.did().as_str()))
            .proof(to_alice.clone())
            .try_build()
            .await?;

        let context = ResolutionContext::new(agent.did(), NOW);
        let error = resolve_proofs(
            &store_of(&[&forged]),
            &context,
            &[Capability::new("store/add", space.did().as_str())],
        )
        .unwrap_err();

        assert_eq!(
            rejections(error),
            vec![Rejection::Discontinuity {
                proof: *to_alice.cid(),
                audience: alice.did(),
                issuer: mallory.did(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_chains_that_never_reach_the_owner() -> TestResult {
        let space = signer(1);
        let alice = signer(2);
        let mallory = signer(3);
        let agent = signer(4);
        let query = [Capability::new("store/remove", space.did().as_str())];
        let context = ResolutionContext::new(agent.did(), NOW);

        let direct = Delegation::builder()
            .issuer(mallory.clone())
            .audience(&agent)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let error = resolve_proofs(&store_of(&[&direct]), &context, &query).unwrap_err();
        assert_eq!(
            rejections(error),
            vec![Rejection::Unrooted {
                cid: *direct.cid(),
                issuer: mallory.did(),
            }]
        );

        let to_alice = Delegation::builder()
            .issuer(mallory.clone())
            .audience(&alice)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let relayed = Delegation::builder()
            .issuer(alice)
            .audience(&agent)
            .capability(Capability::new("*", space.did().as_str()))
            .proof(to_alice.clone())
            .try_build()
            .await?;
        let error = resolve_proofs(&store_of(&[&relayed]), &context, &query).unwrap_err();
        assert_eq!(
            rejections(error),
            vec![Rejection::Unrooted {
                cid: *to_alice.cid(),
                issuer: mallory.did(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_needs_no_proof_for_the_agents_own_resource() -> TestResult {
        let agent = signer(2);
        let context = ResolutionContext::new(agent.did(), NOW);
        let query = [Capability::new("store/add", agent.did().as_str())];

        assert_eq!(
            resolve_proofs(&DelegationStore::new(), &context, &query)?,
            vec![]
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_expands_sessions_and_appends_attestations() -> TestResult {
        let space = signer(1);
        let agent = signer(2);
        let service = signer(3);
        let account = Absentee::from_email("alice@example.com")?;

        let to_account = Delegation::builder()
            .issuer(space.clone())
            .audience(&account)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;
        let session = Delegation::builder()
            .issuer(account.clone())
            .audience(&agent)
            .capability(Capability::new("*", "ucan:*"))
            .proof(to_account.clone())
            .try_build()
            .await?;
        let attestation = Delegation::builder()
            .issuer(service.clone())
            .audience(&agent)
            .capability(
                Capability::new(ATTEST, service.did().as_str()).with_nb("proof", *session.cid()),
            )
            .try_build()
            .await?;

        let mut sessions = SessionIndex::new();
        sessions.insert(*session.cid(), attestation.clone());
        let context = ResolutionContext::new(agent.did(), NOW).with_sessions(sessions);
        let store = store_of(&[&session, &attestation]);

        let resolved = resolve_proofs(
            &store,
            &context,
            &[
                Capability::new("store/add", space.did().as_str()),
                Capability::new("upload/list", space.did().as_str()),
            ],
        )?;
        assert_eq!(resolved, vec![session, attestation]);
        Ok(())
    }
}
