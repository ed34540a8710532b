//! Versioned binary envelope for machine snapshots.
//!
//! Layout:
//!
//! ```text
//! 0..4    magic (system tag)
//! 4..8    format version, u32 LE
//! 8..12   payload length, u32 LE
//! 12..    payload (bincode, fixed-width integers, little-endian)
//! ```
//!
//! The payload encoding has no variable-width integers, so a state made only
//! of fixed-size fields and buffers whose lengths depend solely on the loaded
//! content always encodes to the same number of bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Bytes in front of the payload
pub const HEADER_SIZE: usize = 12;

/// Snapshot errors. A failed load never modifies the running machine.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("not a snapshot for this system (tag {found:02X?})")]
    BadMagic { found: [u8; 4] },

    #[error("snapshot format version {found} is not supported (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("snapshot payload could not be encoded or decoded: {0}")]
    Codec(#[from] bincode::Error),

    #[error("snapshot was taken with different content: {0}")]
    ContentMismatch(String),
}

/// Tag and version identifying one system's snapshot layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotFormat {
    pub magic: [u8; 4],
    pub version: u32,
}

impl SnapshotFormat {
    /// Total encoded size of `state` including the header
    pub fn encoded_len<T: Serialize>(&self, state: &T) -> Result<usize, SnapshotError> {
        Ok(HEADER_SIZE + bincode::serialized_size(state)? as usize)
    }

    /// Encode `state` at the start of `buf`, which must be large enough.
    pub fn encode_into<T: Serialize>(&self, state: &T, buf: &mut [u8]) -> Result<(), SnapshotError> {
        let payload_len = bincode::serialized_size(state)? as usize;
        let total = HEADER_SIZE + payload_len;
        if buf.len() < total {
            return Err(SnapshotError::SizeMismatch {
                expected: total,
                actual: buf.len(),
            });
        }

        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&(payload_len as u32).to_le_bytes());
        bincode::serialize_into(&mut buf[HEADER_SIZE..total], state)?;
        Ok(())
    }

    /// Encode into a fresh buffer
    pub fn encode<T: Serialize>(&self, state: &T) -> Result<Vec<u8>, SnapshotError> {
        let mut buf = vec![0u8; self.encoded_len(state)?];
        self.encode_into(state, &mut buf)?;
        Ok(buf)
    }

    /// Validate the header and decode the payload into a new value.
    pub fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, SnapshotError> {
        if buf.len() < HEADER_SIZE {
            return Err(SnapshotError::SizeMismatch {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let mut found = [0u8; 4];
        found.copy_from_slice(&buf[0..4]);
        if found != self.magic {
            return Err(SnapshotError::BadMagic { found });
        }

        let version = read_u32(&buf[4..8]);
        if version != self.version {
            return Err(SnapshotError::VersionMismatch {
                expected: self.version,
                found: version,
            });
        }

        let payload_len = read_u32(&buf[8..12]) as usize;
        let total = HEADER_SIZE + payload_len;
        if buf.len() < total {
            return Err(SnapshotError::SizeMismatch {
                expected: total,
                actual: buf.len(),
            });
        }

        Ok(bincode::deserialize(&buf[HEADER_SIZE..total])?)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
