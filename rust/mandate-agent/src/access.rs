//! The service side of session attestation.
//!
//! [`AccessService`] issues session pairs when an account approves an agent
//! and hands them out when the agent claims its delegations. A pair is an
//! absentee delegation from the account plus a `ucan/attest` delegation from
//! the service vouching for it; both share one expiration.

use std::time::Duration;

use mandate_credentials::{Absentee, Ed25519Signer};
use mandate_ucan::{Capability, Delegation, Proof, Timestamp, delegation::BuildError};
use mandate_varsig::{Did, Principal};
use tokio::sync::Mutex;

use crate::{
    ProfileStore, StorageBackend,
    data::{DelegationMeta, ServiceData},
    session::{ATTEST, SessionError, attestation_target},
    store::DelegationStore,
};

/// Lifetime of a session pair when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

struct ServiceState<Backend> {
    profile: ProfileStore<Backend>,
    delegations: DelegationStore,
}

impl<Backend> ServiceState<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    /// Saves `delegations` and makes them the live store.
    async fn commit(&mut self, delegations: DelegationStore) -> Result<(), SessionError> {
        let data = ServiceData {
            delegations: delegations.archive()?,
        };
        self.profile.save(&data).await?;
        self.delegations = delegations;
        Ok(())
    }
}

/// Issues and refreshes session pairs on behalf of accounts.
pub struct AccessService<Backend> {
    signer: Ed25519Signer,
    session_ttl: Duration,
    state: Mutex<ServiceState<Backend>>,
}

impl<Backend> AccessService<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    /// Opens the service state saved as `profile`, or starts empty.
    pub async fn open(
        signer: Ed25519Signer,
        backend: Backend,
        profile: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let profile = ProfileStore::new(backend, profile);
        let data: ServiceData = profile.load().await?.unwrap_or_default();
        let delegations = DelegationStore::restore(&data.delegations)?;
        Ok(Self {
            signer,
            session_ttl: DEFAULT_SESSION_TTL,
            state: Mutex::new(ServiceState {
                profile,
                delegations,
            }),
        })
    }

    /// Sets the lifetime of newly issued pairs.
    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    /// The service DID attestations are issued on.
    pub fn did(&self) -> Did {
        self.signer.did()
    }

    /// The lifetime of newly issued pairs.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Every delegation the service holds.
    pub async fn delegations(&self) -> Vec<Delegation> {
        self.state.lock().await.delegations.iter().cloned().collect()
    }

    /// Stores delegations addressed to accounts, so later sessions of those
    /// accounts can carry them as proofs.
    pub async fn delegate(&self, delegations: Vec<Delegation>) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let mut next = state.delegations.clone();
        for delegation in delegations {
            tracing::trace!(cid = %delegation.cid(), aud = %delegation.audience(), "stored delegation");
            next.insert(delegation, DelegationMeta::default());
        }
        state.commit(next).await
    }

    /// Records that `account` approved `agent` for `capabilities`, issuing a
    /// session pair and saving both halves together.
    ///
    /// The account's delegation carries every live delegation stored for the
    /// account as a proof.
    pub async fn confirm(
        &self,
        account: &Did,
        agent: &Did,
        capabilities: Vec<Capability>,
        now: Timestamp,
    ) -> Result<(Delegation, Delegation), SessionError> {
        let mut state = self.state.lock().await;
        let proofs = state
            .delegations
            .issued_to(account)
            .filter(|delegation| delegation.time_range().check(now).is_ok())
            .cloned()
            .map(Proof::from)
            .collect();
        let pair = self
            .issue_pair(Absentee::new(account.clone()), agent, capabilities, proofs, now)
            .await?;

        let mut next = state.delegations.clone();
        for delegation in [&pair.0, &pair.1] {
            next.insert(delegation.clone(), DelegationMeta::default());
        }
        state.commit(next).await?;
        tracing::debug!(%account, %agent, cid = %pair.0.cid(), "confirmed session");
        Ok(pair)
    }

    /// Delegations stored for `audience`.
    ///
    /// Pairs with an expired half are superseded by a fresh pair, unless a
    /// live pair for the same account and capabilities is already stored.
    /// Superseded pairs are left out of the result but kept in the store.
    pub async fn claim(&self, audience: &Did, now: Timestamp) -> Result<Vec<Delegation>, SessionError> {
        let mut state = self.state.lock().await;
        let stored: Vec<Delegation> = state.delegations.issued_to(audience).cloned().collect();
        let service = self.did();

        let mut live: Vec<(Did, Vec<Capability>)> = Vec::new();
        let mut stale: Vec<(Delegation, Delegation)> = Vec::new();
        for attestation in stored.iter().filter(|d| d.issuer() == &service) {
            let Some(attested) = attestation_target(attestation)
                .and_then(|cid| state.delegations.get(&cid))
                .cloned()
            else {
                continue;
            };
            let expired = attestation.time_range().check(now).is_err()
                || attested.time_range().check(now).is_err();
            if expired {
                stale.push((attestation.clone(), attested));
            } else {
                live.push((attested.issuer().clone(), attested.capabilities().to_vec()));
            }
        }

        let mut superseded = Vec::new();
        let mut fresh = Vec::new();
        for (attestation, attested) in stale {
            superseded.push(*attestation.cid());
            superseded.push(*attested.cid());

            let key = (attested.issuer().clone(), attested.capabilities().to_vec());
            if live.contains(&key) || attested.issuer().method() != "mailto" {
                continue;
            }
            let (delegation, attestation) = self
                .issue_pair(
                    Absentee::new(attested.issuer().clone()),
                    attested.audience(),
                    attested.capabilities().to_vec(),
                    attested.proofs()?,
                    now,
                )
                .await?;
            tracing::debug!(old = %attested.cid(), new = %delegation.cid(), "refreshed session");
            live.push(key);
            fresh.push(delegation);
            fresh.push(attestation);
        }

        if !fresh.is_empty() {
            let mut next = state.delegations.clone();
            for delegation in &fresh {
                next.insert(delegation.clone(), DelegationMeta::default());
            }
            state.commit(next).await?;
        }

        Ok(stored
            .into_iter()
            .filter(|delegation| !superseded.contains(delegation.cid()))
            .chain(fresh)
            .collect())
    }

    async fn issue_pair(
        &self,
        account: Absentee,
        audience: &Did,
        capabilities: Vec<Capability>,
        proofs: Vec<Proof>,
        now: Timestamp,
    ) -> Result<(Delegation, Delegation), BuildError> {
        let expiration = now + self.session_ttl;
        let delegation = Delegation::builder()
            .issuer(account)
            .audience(audience)
            .capabilities(capabilities)
            .proofs(proofs)
            .expiration(expiration)
            .try_build()
            .await?;
        let attestation = Delegation::builder()
            .issuer(&self.signer)
            .audience(audience)
            .capability(
                Capability::new(ATTEST, self.did().as_str()).with_nb("proof", *delegation.cid()),
            )
            .expiration(expiration)
            .try_build()
            .await?;
        Ok((delegation, attestation))
    }
}
