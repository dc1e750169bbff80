//! Content-addressed blocks.
//!
//! Every delegation is stored as a dag-cbor block whose CID is derived from
//! its bytes. Blocks are shared between delegations through a [`Blocks`]
//! pool so that a chain of proofs decoded from one bundle references a
//! single copy of each block.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use ipld_core::cid::{Cid, multihash::Multihash};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Multicodec code of the dag-cbor IPLD codec.
pub const DAG_CBOR: u64 = 0x71;

/// Multicodec code of the sha2-256 multihash.
pub const SHA2_256: u64 = 0x12;

/// An insertion-ordered pool of blocks keyed by CID.
pub type Blocks = IndexMap<Cid, Block>;

/// Computes the CIDv1 (dag-cbor, sha2-256) of `bytes`.
#[must_use]
#[allow(clippy::expect_used)]
pub fn cid_of(bytes: &[u8]) -> Cid {
    let digest = Sha256::digest(bytes);
    let multihash =
        Multihash::<64>::wrap(SHA2_256, digest.as_slice()).expect("a sha2-256 digest fits in 64 bytes");
    Cid::new_v1(DAG_CBOR, multihash)
}

/// Encodes `value` as dag-cbor and computes its CID.
///
/// # Errors
///
/// Returns the codec error if `value` cannot be represented as dag-cbor.
pub fn to_dagcbor_block<T: Serialize>(value: &T) -> Result<Block, EncodeError> {
    let bytes = serde_ipld_dagcbor::to_vec(value).map_err(|error| EncodeError(error.to_string()))?;
    Ok(Block::new(bytes))
}

/// A value could not be encoded as dag-cbor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dag-cbor encoding failed: {0}")]
pub struct EncodeError(pub String);

/// Raw bytes together with their CID.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    bytes: Arc<[u8]>,
}

impl Block {
    /// Wraps bytes, deriving their CID.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Self {
            cid: cid_of(&bytes),
            bytes,
        }
    }

    /// Pairs bytes with a CID that the caller has already checked.
    pub(crate) fn from_parts(cid: Cid, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            cid,
            bytes: bytes.into(),
        }
    }

    /// The block's CID.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// The block's bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("cid", &self.cid.to_string())
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_the_same_cid_for_the_same_bytes() {
        let a = Block::new(b"hello".to_vec());
        let b = Block::new(b"hello".to_vec());
        let c = Block::new(b"world".to_vec());
        assert_eq!(a.cid(), b.cid());
        assert_ne!(a.cid(), c.cid());
    }

    #[test]
    fn it_produces_dag_cbor_sha256_cids() {
        let cid = cid_of(b"hello");
        assert_eq!(cid.version(), ipld_core::cid::Version::V1);
        assert_eq!(cid.codec(), DAG_CBOR);
        assert_eq!(cid.hash().code(), SHA2_256);
        assert_eq!(cid.hash().digest().len(), 32);
        // CIDv1 strings are base32 lower-case
        assert!(cid.to_string().starts_with("bafy"));
    }
}
