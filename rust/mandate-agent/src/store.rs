//! The in-memory delegation store of an agent or service.

use indexmap::IndexMap;
use ipld_core::cid::Cid;
use mandate_ucan::{Delegation, delegation::DelegationError};
use mandate_varsig::Did;

use crate::{
    StorageError,
    data::{DelegationMeta, DelegationRecord},
};

/// A stored delegation and its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDelegation {
    /// The delegation.
    pub delegation: Delegation,
    /// Metadata recorded when it was added.
    pub meta: DelegationMeta,
}

/// Delegations keyed by CID, in insertion order.
///
/// Entries never expire on their own; validity windows are checked when
/// proofs are selected.
#[derive(Debug, Clone, Default)]
pub struct DelegationStore {
    entries: IndexMap<Cid, StoredDelegation>,
}

impl DelegationStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a delegation. Re-adding a CID keeps its position and replaces the
    /// metadata.
    pub fn insert(&mut self, delegation: Delegation, meta: DelegationMeta) {
        let cid = *delegation.cid();
        tracing::trace!(%cid, "storing delegation");
        self.entries
            .insert(cid, StoredDelegation { delegation, meta });
    }

    /// Removes the delegation with CID `cid`, returning it.
    pub fn remove(&mut self, cid: &Cid) -> Option<StoredDelegation> {
        self.entries.shift_remove(cid)
    }

    /// Looks a delegation up by CID.
    pub fn get(&self, cid: &Cid) -> Option<&Delegation> {
        self.entries.get(cid).map(|entry| &entry.delegation)
    }

    /// Looks an entry up by CID.
    pub fn entry(&self, cid: &Cid) -> Option<&StoredDelegation> {
        self.entries.get(cid)
    }

    /// Whether the store holds `cid`.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.entries.contains_key(cid)
    }

    /// All delegations, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Delegation> {
        self.entries.values().map(|entry| &entry.delegation)
    }

    /// Delegations addressed to `audience`, in insertion order.
    pub fn issued_to<'a>(&'a self, audience: &'a Did) -> impl Iterator<Item = &'a Delegation> + 'a {
        self.iter()
            .filter(move |delegation| delegation.audience() == audience)
    }

    /// Number of stored delegations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn archive(&self) -> Result<Vec<DelegationRecord>, DelegationError> {
        self.entries
            .values()
            .map(|entry| DelegationRecord::archive(&entry.delegation, entry.meta.clone()))
            .collect()
    }

    pub(crate) fn restore(records: &[DelegationRecord]) -> Result<Self, StorageError> {
        let mut store = Self::new();
        for record in records {
            store.insert(record.restore()?, record.meta.clone());
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use mandate_credentials::Ed25519Signer;
    use mandate_ucan::Capability;
    use mandate_varsig::Principal;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    use super::*;

    async fn grant(issuer: u8, audience: u8) -> TestResult<Delegation> {
        let issuer = Ed25519Signer::import(&[issuer; 32])?;
        let audience = Ed25519Signer::import(&[audience; 32])?;
        Ok(Delegation::builder()
            .issuer(issuer.clone())
            .audience(&audience)
            .capability(Capability::new("*", issuer.did().as_str()))
            .try_build()
            .await?)
    }

    #[tokio::test]
    async fn it_keeps_insertion_order_through_dag_cbor() -> TestResult {
        let mut grants = vec![grant(1, 9).await?, grant(2, 8).await?, grant(3, 9).await?];
        // Reverse key order, so a canonical map encoding would reorder them.
        grants.sort_by_key(|grant| std::cmp::Reverse(grant.cid().to_string()));

        let mut store = DelegationStore::new();
        for grant in &grants {
            store.insert(grant.clone(), DelegationMeta::default());
        }

        let bytes = serde_ipld_dagcbor::to_vec(&store.archive()?)?;
        let records: Vec<DelegationRecord> = serde_ipld_dagcbor::from_slice(&bytes)?;
        let restored = DelegationStore::restore(&records)?;
        let cids: Vec<_> = restored.iter().map(|d| *d.cid()).collect();
        assert_eq!(cids, grants.iter().map(|d| *d.cid()).collect::<Vec<_>>());

        let audience = grant(1, 9).await?.audience().clone();
        let issued: Vec<_> = restored.issued_to(&audience).cloned().collect();
        let expected: Vec<_> = grants
            .into_iter()
            .filter(|grant| grant.audience() == &audience)
            .collect();
        assert_eq!(issued, expected);
        Ok(())
    }

    #[tokio::test]
    async fn it_removes_entries() -> TestResult {
        let delegation = grant(1, 2).await?;
        let mut store = DelegationStore::new();
        store.insert(delegation.clone(), DelegationMeta::default());

        assert!(store.contains(delegation.cid()));
        assert!(store.remove(delegation.cid()).is_some());
        assert!(store.is_empty());
        assert!(store.remove(delegation.cid()).is_none());
        Ok(())
    }
}
