use std::future::Future;

use indexmap::IndexMap;
use ipld_core::cid::Cid;
use mandate_common::poll::{PollError, PollOptions, poll_until};
use mandate_credentials::Ed25519Signer;
use mandate_ucan::{Capability, Delegation, Timestamp, car};
use mandate_varsig::{Did, Principal, Resolver};

use crate::{
    AgentError, ProfileStore, StorageBackend,
    data::{AgentData, ArchivedPrincipal, DelegationMeta, PrincipalMeta, SpaceMeta, SpaceRecord},
    proofs::{ResolutionContext, resolve_proofs},
    session::{has_attested_session, scan_attestations},
    store::DelegationStore,
};

/// What [`Agent::delegate`] should issue.
#[derive(Debug, Clone)]
pub struct DelegationRequest {
    /// Who receives the delegation.
    pub audience: Did,
    /// Stored next to the delegation.
    pub audience_meta: Option<PrincipalMeta>,
    /// Capabilities to re-delegate. Each must be backed by a stored proof.
    pub capabilities: Vec<Capability>,
    /// Expiration of the new delegation, `None` for no expiry.
    pub expiration: Option<Timestamp>,
}

/// The mutable part of an agent. Changes are staged on a copy and only
/// replace the live state once the profile is saved.
#[derive(Debug, Clone, Default)]
struct AgentState {
    spaces: IndexMap<Did, SpaceMeta>,
    current_space: Option<Did>,
    delegations: DelegationStore,
}

/// A keyed principal that holds delegations and persists them in a profile.
///
/// Every mutating operation saves the profile before returning. When the
/// save fails the agent is left as it was.
pub struct Agent<Backend> {
    profile: ProfileStore<Backend>,
    signer: Ed25519Signer,
    meta: PrincipalMeta,
    state: AgentState,
}

impl<Backend> std::fmt::Debug for Agent<Backend> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("did", &self.signer.did())
            .field("meta", &self.meta)
            .field("spaces", &self.state.spaces)
            .field("current_space", &self.state.current_space)
            .field("delegations", &self.state.delegations.len())
            .finish()
    }
}

impl<Backend> Agent<Backend>
where
    Backend: StorageBackend<Key = Vec<u8>, Value = Vec<u8>>,
{
    /// Creates a new agent with a fresh key and saves it as `profile`.
    pub async fn create(
        backend: Backend,
        profile: impl Into<String>,
        meta: PrincipalMeta,
    ) -> Result<Self, AgentError> {
        let mut agent = Self {
            profile: ProfileStore::new(backend, profile),
            signer: Ed25519Signer::generate()?,
            meta,
            state: AgentState::default(),
        };
        tracing::debug!(did = %agent.did(), profile = agent.profile.name(), "created agent");
        agent.commit(AgentState::default()).await?;
        Ok(agent)
    }

    /// Loads the agent saved as `profile`.
    pub async fn load(backend: Backend, profile: impl Into<String>) -> Result<Self, AgentError> {
        let profile = ProfileStore::new(backend, profile);
        let data: AgentData = profile
            .load()
            .await?
            .ok_or_else(|| AgentError::ProfileNotFound(profile.name().to_owned()))?;

        let agent = Self {
            signer: Ed25519Signer::import(&data.principal.seed)?,
            meta: data.meta,
            state: AgentState {
                spaces: data
                    .spaces
                    .into_iter()
                    .map(|space| (space.did, space.meta))
                    .collect(),
                current_space: data.current_space,
                delegations: DelegationStore::restore(&data.delegations)?,
            },
            profile,
        };
        tracing::debug!(
            did = %agent.did(),
            delegations = agent.state.delegations.len(),
            "loaded agent"
        );
        Ok(agent)
    }

    /// Loads `profile`, creating it when it does not exist yet.
    pub async fn open(
        backend: Backend,
        profile: impl Into<String>,
        meta: PrincipalMeta,
    ) -> Result<Self, AgentError> {
        let profile = profile.into();
        match Self::load(backend.clone(), profile.clone()).await {
            Err(AgentError::ProfileNotFound(_)) => Self::create(backend, profile, meta).await,
            other => other,
        }
    }

    /// Saves `next` and makes it the live state.
    async fn commit(&mut self, next: AgentState) -> Result<(), AgentError> {
        let data = AgentData {
            meta: self.meta.clone(),
            principal: ArchivedPrincipal {
                seed: self.signer.export().to_vec(),
            },
            spaces: next
                .spaces
                .iter()
                .map(|(did, meta)| SpaceRecord {
                    did: did.clone(),
                    meta: meta.clone(),
                })
                .collect(),
            current_space: next.current_space.clone(),
            delegations: next.delegations.archive()?,
        };
        self.profile.save(&data).await?;
        self.state = next;
        Ok(())
    }

    /// The agent's DID.
    pub fn did(&self) -> Did {
        self.signer.did()
    }

    /// The agent's signer.
    pub fn signer(&self) -> &Ed25519Signer {
        &self.signer
    }

    /// The agent's description.
    pub fn meta(&self) -> &PrincipalMeta {
        &self.meta
    }

    /// Known spaces.
    pub fn spaces(&self) -> &IndexMap<Did, SpaceMeta> {
        &self.state.spaces
    }

    /// The space commands act on by default.
    pub fn current_space(&self) -> Option<&Did> {
        self.state.current_space.as_ref()
    }

    /// Stored delegations.
    pub fn delegations(&self) -> &DelegationStore {
        &self.state.delegations
    }

    /// Stores a delegation.
    pub async fn add_proof(&mut self, delegation: Delegation) -> Result<(), AgentError> {
        self.add_proofs([delegation]).await
    }

    /// Stores several delegations with a single save.
    pub async fn add_proofs(
        &mut self,
        delegations: impl IntoIterator<Item = Delegation>,
    ) -> Result<(), AgentError> {
        let mut next = self.state.clone();
        for delegation in delegations {
            next.delegations.insert(delegation, DelegationMeta::default());
        }
        self.commit(next).await
    }

    /// Removes the delegation with CID `cid`.
    pub async fn remove_proof(&mut self, cid: &Cid) -> Result<Delegation, AgentError> {
        let mut next = self.state.clone();
        let removed = next
            .delegations
            .remove(cid)
            .ok_or(AgentError::DelegationNotFound(*cid))?;
        self.commit(next).await?;
        Ok(removed.delegation)
    }

    /// Stores every root of a CAR bundle.
    pub async fn import_proofs(&mut self, bundle: &[u8]) -> Result<Vec<Delegation>, AgentError> {
        let delegations = car::decode(bundle)?;
        tracing::debug!(count = delegations.len(), "importing proofs");
        self.add_proofs(delegations.iter().cloned()).await?;
        Ok(delegations)
    }

    /// Creates a space owned by a throwaway key, which delegates `*` on the
    /// space to this agent. The first space becomes the current one.
    pub async fn create_space(&mut self, name: impl Into<String>) -> Result<Did, AgentError> {
        let space = Ed25519Signer::generate()?;
        let ownership = Delegation::builder()
            .issuer(space.clone())
            .audience(&self.signer)
            .capability(Capability::new("*", space.did().as_str()))
            .try_build()
            .await?;

        let did = space.did();
        tracing::debug!(space = %did, "created space");
        let mut next = self.state.clone();
        next.delegations.insert(
            ownership,
            DelegationMeta {
                audience: Some(self.meta.clone()),
            },
        );
        next.spaces.insert(did.clone(), SpaceMeta { name: name.into() });
        if next.current_space.is_none() {
            next.current_space = Some(did.clone());
        }
        self.commit(next).await?;
        Ok(did)
    }

    /// Selects `space` as the current space.
    pub async fn set_current_space(&mut self, space: &Did) -> Result<(), AgentError> {
        if !self.state.spaces.contains_key(space) {
            return Err(AgentError::UnknownSpace(space.clone()));
        }
        let mut next = self.state.clone();
        next.current_space = Some(space.clone());
        self.commit(next).await
    }

    /// A resolution context for this agent without session attestations.
    pub fn context(&self, now: Timestamp) -> ResolutionContext {
        ResolutionContext::new(self.did(), now)
    }

    /// A resolution context carrying the attestations `service` issued.
    pub async fn session_context<R>(
        &self,
        service: &Did,
        resolver: &R,
        now: Timestamp,
    ) -> ResolutionContext
    where
        R: Resolver,
    {
        let sessions = scan_attestations(&self.state.delegations, service, resolver, now).await;
        self.context(now).with_sessions(sessions)
    }

    /// Selects the stored delegations authorizing `query`.
    pub fn proofs(
        &self,
        query: &[Capability],
        context: &ResolutionContext,
    ) -> Result<Vec<Delegation>, AgentError> {
        Ok(resolve_proofs(&self.state.delegations, context, query)?)
    }

    /// Re-delegates capabilities this agent holds, storing the result.
    pub async fn delegate(
        &mut self,
        request: DelegationRequest,
        context: &ResolutionContext,
    ) -> Result<Delegation, AgentError> {
        let proofs = self.proofs(&request.capabilities, context)?;
        let mut builder = Delegation::builder()
            .issuer(&self.signer)
            .audience(&request.audience)
            .capabilities(request.capabilities)
            .proofs(proofs);
        if let Some(expiration) = request.expiration {
            builder = builder.expiration(expiration);
        }
        let delegation = builder.try_build().await?;

        tracing::debug!(cid = %delegation.cid(), aud = %request.audience, "delegated");
        let mut next = self.state.clone();
        next.delegations.insert(
            delegation.clone(),
            DelegationMeta {
                audience: request.audience_meta,
            },
        );
        self.commit(next).await?;
        Ok(delegation)
    }

    /// Repeatedly calls `claim` until it returns a delegation from `account`
    /// along with an attestation of it by `service`, then stores everything
    /// claimed.
    pub async fn wait_for_session<Claim, Fut, E>(
        &mut self,
        account: &Did,
        service: &Did,
        claim: Claim,
        options: &PollOptions,
    ) -> Result<Vec<Delegation>, AgentError>
    where
        Claim: FnMut() -> Fut,
        Fut: Future<Output = Result<Vec<Delegation>, E>>,
        E: std::fmt::Display,
    {
        let claimed = poll_until(
            claim,
            |delegations: &Vec<Delegation>| has_attested_session(delegations, account, service),
            options,
        )
        .await
        .map_err(|error| match error {
            PollError::Aborted { reason } => AgentError::Aborted { reason },
            PollError::Operation(error) => AgentError::Claim(error.to_string()),
        })?;

        self.add_proofs(claimed.iter().cloned()).await?;
        Ok(claimed)
    }
}
