use ipld_core::cid::Cid;

use super::{CarHeader, error::EncodeError, write_varint};
use crate::block::{Block, Blocks};

/// Accumulates roots and de-duplicated blocks, then emits a CAR v1 file.
#[derive(Debug, Default)]
pub struct CarWriter {
    roots: Vec<Cid>,
    blocks: Blocks,
}

impl CarWriter {
    /// Starts a CAR with the given roots. Duplicate roots are kept.
    pub fn new(roots: impl IntoIterator<Item = Cid>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
            blocks: Blocks::new(),
        }
    }

    /// Adds a root.
    pub fn add_root(&mut self, root: Cid) {
        self.roots.push(root);
    }

    /// Adds a block unless one with the same CID was already written.
    pub fn write(&mut self, block: Block) {
        self.blocks.entry(*block.cid()).or_insert(block);
    }

    /// Number of distinct blocks written so far.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no blocks were written.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serializes the header followed by every block section.
    ///
    /// # Errors
    ///
    /// Fails only if the header cannot be encoded.
    pub fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let header = serde_ipld_dagcbor::to_vec(&CarHeader {
            roots: self.roots,
            version: 1,
        })
        .map_err(|error| crate::block::EncodeError(error.to_string()))?;

        let mut out = Vec::with_capacity(header.len() + 10);
        write_varint(&mut out, header.len());
        out.extend_from_slice(&header);

        for block in self.blocks.values() {
            let cid = block.cid().to_bytes();
            write_varint(&mut out, cid.len() + block.bytes().len());
            out.extend_from_slice(&cid);
            out.extend_from_slice(block.bytes());
        }
        Ok(out)
    }
}
