//! CAR (content-addressed archive) bundles of delegations.
//!
//! [`encode`] writes a CAR v1 file whose roots are the given delegations and
//! whose blocks are the de-duplicated union of everything they export.
//! [`decode`] accepts CAR v1 and v2 and rebuilds one [`Delegation`] per root,
//! all sharing the same pool of blocks.

mod error;
mod reader;
mod writer;

use std::sync::Arc;

use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};

pub use error::{DecodeError, EncodeError};
pub use reader::{CarReader, CarV2Header};
pub use writer::CarWriter;

use crate::{block::Blocks, delegation::Delegation};

/// Length of the fixed CARv2 header following the pragma.
const V2_HEADER_LEN: usize = 40;

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    #[serde(default)]
    roots: Vec<Cid>,
    version: u64,
}

/// Encodes delegations and all of their attached proofs as a CAR v1 file.
///
/// Roots follow the input order, duplicates included; each block appears
/// once, at its first occurrence.
///
/// # Errors
///
/// Returns [`EncodeError::EmptyInput`] for an empty slice.
pub fn encode(delegations: &[Delegation]) -> Result<Vec<u8>, EncodeError> {
    if delegations.is_empty() {
        return Err(EncodeError::EmptyInput);
    }

    let mut writer = CarWriter::new(delegations.iter().map(|delegation| *delegation.cid()));
    for delegation in delegations {
        for block in delegation.export()? {
            writer.write(block);
        }
    }
    tracing::debug!(
        roots = delegations.len(),
        blocks = writer.len(),
        "encoded delegation bundle"
    );
    writer.finish()
}

/// Decodes a CAR v1 or v2 file into one delegation per root, in header order.
///
/// # Errors
///
/// Fails on empty or malformed input and when a root has no block.
pub fn decode(bytes: &[u8]) -> Result<Vec<Delegation>, DecodeError> {
    let reader = CarReader::new(bytes)?;

    let mut pool = Blocks::new();
    for block in reader.blocks()? {
        pool.entry(*block.cid()).or_insert(block);
    }
    let pool = Arc::new(pool);
    tracing::debug!(
        version = reader.version(),
        roots = reader.roots().len(),
        blocks = pool.len(),
        "decoded delegation bundle"
    );

    reader
        .roots()
        .iter()
        .map(|root| {
            let block = pool
                .get(root)
                .cloned()
                .ok_or(DecodeError::RootBlockNotFound(*root))?;
            Ok(Delegation::from_block(block, pool.clone())?)
        })
        .collect()
}

fn write_varint(out: &mut Vec<u8>, value: usize) {
    // Writing into a Vec cannot fail.
    let _ = leb128::write::unsigned(out, value as u64);
}

fn read_varint(cursor: &mut &[u8]) -> Result<usize, DecodeError> {
    let value = leb128::read::unsigned(cursor)
        .map_err(|error| DecodeError::InvalidCarFormat(format!("bad varint: {error}")))?;
    usize::try_from(value).map_err(|error| DecodeError::InvalidCarFormat(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::Block, capability::Capability};
    use mandate_credentials::Ed25519Signer;
    use mandate_varsig::Principal;
    use testresult::TestResult;

    async fn delegation(seed: u8) -> Delegation {
        let signer = Ed25519Signer::import(&[seed; 32]).unwrap();
        Delegation::builder()
            .issuer(signer.clone())
            .audience(&signer)
            .capability(Capability::new("*", signer.did().as_str()))
            .try_build()
            .await
            .unwrap()
    }

    /// Wraps a CARv1 file in a CARv2 envelope.
    fn to_v2(v1: &[u8]) -> Vec<u8> {
        let pragma = [
            0x0a, 0xa1, 0x67, b'v', b'e', b'r', b's', b'i', b'o', b'n', 0x02,
        ];
        let data_offset = (pragma.len() + V2_HEADER_LEN) as u64;
        let mut out = pragma.to_vec();
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&data_offset.to_le_bytes());
        out.extend_from_slice(&(v1.len() as u64).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(v1);
        out
    }

    #[tokio::test]
    async fn it_decodes_car_v2() -> TestResult {
        let first = delegation(1).await;
        let second = delegation(2).await;
        let v1 = encode(&[first.clone(), second.clone()])?;

        let reader_v2 = to_v2(&v1);
        let reader = CarReader::new(&reader_v2)?;
        assert_eq!(reader.version(), 2);
        assert_eq!(
            reader.v2_header(),
            Some(&CarV2Header {
                characteristics: [0; 16],
                data_offset: 51,
                data_size: v1.len() as u64,
                index_offset: 0,
            })
        );
        assert!(!reader.v2_header().is_some_and(CarV2Header::is_fully_indexed));
        assert!(CarReader::new(&v1)?.v2_header().is_none());

        let decoded = decode(&reader_v2)?;
        let cids: Vec<Cid> = decoded.iter().map(|d| *d.cid()).collect();
        assert_eq!(cids, vec![*first.cid(), *second.cid()]);
        Ok(())
    }

    #[test]
    fn it_rejects_truncated_v2_payloads() -> TestResult {
        let mut bytes = to_v2(&[]);
        // claim a payload larger than the file
        bytes[11 + 24..11 + 32].copy_from_slice(&1_000u64.to_le_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::InvalidCarFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_versions() -> TestResult {
        let header = serde_ipld_dagcbor::to_vec(&CarHeader {
            roots: vec![],
            version: 3,
        })?;
        let mut bytes = Vec::new();
        write_varint(&mut bytes, header.len());
        bytes.extend_from_slice(&header);
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(3)));
        Ok(())
    }

    #[test]
    fn it_reports_missing_root_blocks() -> TestResult {
        let missing = Block::new(b"never written".to_vec());
        let bytes = CarWriter::new([*missing.cid()]).finish()?;
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::RootBlockNotFound(*missing.cid()))
        );
        Ok(())
    }

    #[test]
    fn it_detects_corrupted_blocks() -> TestResult {
        let block = Block::new(b"original".to_vec());
        let mut writer = CarWriter::new([*block.cid()]);
        writer.write(Block::from_parts(*block.cid(), b"tampered".to_vec()));
        let bytes = writer.finish()?;
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::BlockHashMismatch(*block.cid()))
        );
        Ok(())
    }
}
