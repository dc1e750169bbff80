use std::io::Cursor;

use ipld_core::cid::Cid;
use sha2::{Digest, Sha256};

use super::{CarHeader, V2_HEADER_LEN, error::DecodeError, read_varint};
use crate::block::{Block, SHA2_256};

/// Multicodec code of the identity multihash.
const IDENTITY: u64 = 0x00;

/// The fixed header of a CARv2 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarV2Header {
    /// Characteristics bitfield.
    pub characteristics: [u8; 16],
    /// Offset of the CARv1 payload from the start of the file.
    pub data_offset: u64,
    /// Length of the CARv1 payload.
    pub data_size: u64,
    /// Offset of the index from the start of the file, 0 when absent.
    pub index_offset: u64,
}

impl CarV2Header {
    /// Whether the index is fully indexed (the leftmost characteristics bit).
    pub fn is_fully_indexed(&self) -> bool {
        self.characteristics[0] & 0x80 != 0
    }
}

/// Parses the header of a CAR v1 or v2 file and iterates its blocks.
#[derive(Debug, Clone)]
pub struct CarReader<'a> {
    version: u64,
    roots: Vec<Cid>,
    v2: Option<CarV2Header>,
    data: &'a [u8],
}

impl<'a> CarReader<'a> {
    /// Parses the header. For v2 files the embedded v1 payload is located
    /// through the data offset and size recorded in the fixed header.
    ///
    /// # Errors
    ///
    /// Fails on empty input, truncated or undecodable headers and versions
    /// other than 1 and 2.
    pub fn new(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::InvalidInput("empty CAR input".into()));
        }

        let (header, rest) = read_header(bytes)?;
        match header.version {
            1 => Ok(Self {
                version: 1,
                roots: header.roots,
                v2: None,
                data: rest,
            }),
            2 => {
                let v2 = read_v2_header(rest)?;
                let payload = v2_payload(bytes, &v2)?;
                let (inner, data) = read_header(payload)?;
                if inner.version != 1 {
                    return Err(DecodeError::InvalidCarFormat(format!(
                        "CARv2 payload must be CARv1, found version {}",
                        inner.version
                    )));
                }
                Ok(Self {
                    version: 2,
                    roots: inner.roots,
                    v2: Some(v2),
                    data,
                })
            }
            version => Err(DecodeError::UnsupportedVersion(version)),
        }
    }

    /// Version announced by the outer header.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The fixed CARv2 header, for v2 files.
    pub fn v2_header(&self) -> Option<&CarV2Header> {
        self.v2.as_ref()
    }

    /// Roots in header order, duplicates included.
    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Reads every block section in file order.
    ///
    /// # Errors
    ///
    /// Fails on truncated sections, unreadable CIDs and blocks whose bytes
    /// do not match their multihash.
    pub fn blocks(&self) -> Result<Vec<Block>, DecodeError> {
        let mut blocks = Vec::new();
        let mut cursor = self.data;
        while !cursor.is_empty() {
            let len = read_varint(&mut cursor)?;
            if len == 0 || len > cursor.len() {
                return Err(DecodeError::InvalidCarFormat(format!(
                    "block section of {len} bytes exceeds the {} remaining",
                    cursor.len()
                )));
            }
            let (section, rest) = cursor.split_at(len);
            cursor = rest;

            let mut reader = Cursor::new(section);
            let cid = Cid::read_bytes(&mut reader)
                .map_err(|error| DecodeError::InvalidCarFormat(format!("bad CID: {error}")))?;
            let offset = usize::try_from(reader.position())
                .map_err(|error| DecodeError::InvalidCarFormat(error.to_string()))?;
            let bytes = &section[offset..];

            verify_multihash(&cid, bytes)?;
            blocks.push(Block::from_parts(cid, bytes.to_vec()));
        }
        Ok(blocks)
    }
}

fn read_header(bytes: &[u8]) -> Result<(CarHeader, &[u8]), DecodeError> {
    let mut cursor = bytes;
    let len = read_varint(&mut cursor)?;
    if len == 0 || len > cursor.len() {
        return Err(DecodeError::InvalidCarFormat(format!(
            "header of {len} bytes exceeds the {} available",
            cursor.len()
        )));
    }
    let (header, rest) = cursor.split_at(len);
    let header: CarHeader = serde_ipld_dagcbor::from_slice(header)
        .map_err(|error| DecodeError::InvalidCarFormat(format!("bad header: {error}")))?;
    Ok((header, rest))
}

/// Reads the fixed header following the pragma: 16 bytes of
/// characteristics, then `dataOffset`, `dataSize` and `indexOffset` as
/// little-endian u64.
fn read_v2_header(after_pragma: &[u8]) -> Result<CarV2Header, DecodeError> {
    if after_pragma.len() < V2_HEADER_LEN {
        return Err(DecodeError::InvalidCarFormat(
            "truncated CARv2 header".into(),
        ));
    }
    let field = |at: usize| {
        let mut le = [0u8; 8];
        le.copy_from_slice(&after_pragma[at..at + 8]);
        u64::from_le_bytes(le)
    };
    let mut characteristics = [0u8; 16];
    characteristics.copy_from_slice(&after_pragma[..16]);
    Ok(CarV2Header {
        characteristics,
        data_offset: field(16),
        data_size: field(24),
        index_offset: field(32),
    })
}

/// Locates the CARv1 payload of a v2 file.
fn v2_payload<'a>(file: &'a [u8], header: &CarV2Header) -> Result<&'a [u8], DecodeError> {
    let to_usize = |value: u64| {
        usize::try_from(value).map_err(|error| DecodeError::InvalidCarFormat(error.to_string()))
    };
    let data_offset = to_usize(header.data_offset)?;
    let data_size = to_usize(header.data_size)?;

    let end = data_offset
        .checked_add(data_size)
        .filter(|end| *end <= file.len())
        .ok_or_else(|| {
            DecodeError::InvalidCarFormat(format!(
                "CARv2 payload {data_offset}+{data_size} exceeds file of {} bytes",
                file.len()
            ))
        })?;
    Ok(&file[data_offset..end])
}

fn verify_multihash(cid: &Cid, bytes: &[u8]) -> Result<(), DecodeError> {
    let hash = cid.hash();
    let matches = match hash.code() {
        SHA2_256 => Sha256::digest(bytes).as_slice() == hash.digest(),
        IDENTITY => bytes == hash.digest(),
        code => {
            tracing::trace!(%cid, code, "skipping verification of unsupported multihash");
            true
        }
    };
    if matches {
        Ok(())
    } else {
        Err(DecodeError::BlockHashMismatch(*cid))
    }
}
