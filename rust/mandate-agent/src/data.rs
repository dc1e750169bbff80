//! The persisted shape of an agent profile.
//!
//! Everything here is plain data. Delegations are archived as the blocks of
//! their export so they can be rebuilt, proofs included, without any other
//! context.

use std::sync::Arc;

use ipld_core::cid::Cid;
use mandate_ucan::{Block, Blocks, Delegation, delegation::DelegationError};
use mandate_varsig::Did;
use serde::{Deserialize, Serialize};

use crate::StorageError;

/// What kind of principal a profile or an audience belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// An end-user device.
    Device,
    /// An application acting on its own.
    App,
    /// A hosted service.
    Service,
}

/// Human-facing description of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalMeta {
    /// Display name.
    pub name: String,
    /// Principal kind.
    #[serde(rename = "type")]
    pub kind: PrincipalKind,
}

impl PrincipalMeta {
    /// Describes a device called `name`.
    pub fn device(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Device,
        }
    }

    /// Describes a service called `name`.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Service,
        }
    }
}

/// Metadata stored next to a delegation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationMeta {
    /// Who the delegation was issued to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<PrincipalMeta>,
}

/// Metadata of a space the agent owns or has joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceMeta {
    /// Display name.
    pub name: String,
}

/// An archived signer: the raw ed25519 seed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedPrincipal {
    #[serde(with = "serde_bytes")]
    pub(crate) seed: Vec<u8>,
}

impl std::fmt::Debug for ArchivedPrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivedPrincipal").finish_non_exhaustive()
    }
}

/// A single archived block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// CID of the block, as a string.
    pub cid: String,
    /// Block bytes.
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

/// An archived delegation: its export, de-duplicated, plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    /// CID of the delegation, as a string.
    pub cid: String,
    /// Proof blocks followed by the delegation's own block.
    pub blocks: Vec<BlockRecord>,
    /// Metadata.
    pub meta: DelegationMeta,
}

impl DelegationRecord {
    /// Archives `delegation` with its inlined proofs.
    pub fn archive(delegation: &Delegation, meta: DelegationMeta) -> Result<Self, DelegationError> {
        let mut seen = Blocks::new();
        for block in delegation.export()? {
            seen.entry(*block.cid()).or_insert(block);
        }
        let blocks = seen
            .into_values()
            .map(|block| BlockRecord {
                cid: block.cid().to_string(),
                bytes: block.bytes().to_vec(),
            })
            .collect();
        Ok(Self {
            cid: delegation.cid().to_string(),
            blocks,
            meta,
        })
    }

    /// Rebuilds the archived delegation from its blocks.
    ///
    /// Every block is re-hashed and must match the CID it was archived
    /// under.
    pub fn restore(&self) -> Result<Delegation, StorageError> {
        let cid = Cid::try_from(self.cid.as_str())
            .map_err(|error| StorageError::DecodeFailed(format!("{error}")))?;
        let mut pool = Blocks::new();
        for record in &self.blocks {
            let expected = Cid::try_from(record.cid.as_str())
                .map_err(|error| StorageError::DecodeFailed(format!("{error}")))?;
            let block = Block::new(record.bytes.clone());
            if *block.cid() != expected {
                return Err(StorageError::DecodeFailed(format!(
                    "block {expected} does not match its bytes"
                )));
            }
            pool.insert(expected, block);
        }
        let root = pool
            .get(&cid)
            .cloned()
            .ok_or_else(|| StorageError::DecodeFailed(format!("missing root block {cid}")))?;
        Delegation::from_block(root, Arc::new(pool))
            .map_err(|error| StorageError::DecodeFailed(format!("{error}")))
    }
}

/// A known space. Spaces persist as a list so their order survives
/// dag-cbor's canonical map key ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceRecord {
    /// The space DID.
    pub did: Did,
    /// Its metadata.
    pub meta: SpaceMeta,
}

/// The persisted agent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentData {
    /// The agent's own description.
    pub meta: PrincipalMeta,
    /// The agent's signing key.
    pub principal: ArchivedPrincipal,
    /// Spaces the agent knows about, in the order they were added.
    pub spaces: Vec<SpaceRecord>,
    /// The space commands act on by default.
    #[serde(rename = "currentSpace", default, skip_serializing_if = "Option::is_none")]
    pub current_space: Option<Did>,
    /// Stored delegations, in insertion order.
    pub delegations: Vec<DelegationRecord>,
}

/// The persisted state of an access service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceData {
    /// Stored delegations, in insertion order.
    pub delegations: Vec<DelegationRecord>,
}
