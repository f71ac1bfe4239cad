//! Fragment addressing.
//!
//! The camera publishes every chunk under its own address
//! `esp32-cam/jpeg/{frame_id}/{chunk_index}/{chunk_count}`. Parsing happens
//! here, before anything reaches the reassembly engine, so the engine never
//! sees a malformed fragment.

use std::fmt;

use crate::reassembly::Fragment;
use crate::{Error, Result};

const SEGMENTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentAddress {
    pub frame_id: u64,
    pub chunk_index: u32,
    pub chunk_count: u32,
}

impl FragmentAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let parts: Vec<&str> = address.split('/').collect();
        if parts.len() != SEGMENTS {
            return Err(Error::malformed(address, "expected five `/`-separated segments"));
        }

        let frame_id = parts[2]
            .parse::<u64>()
            .map_err(|_| Error::malformed(address, "frame id is not an unsigned integer"))?;
        let chunk_index = parts[3]
            .parse::<u32>()
            .map_err(|_| Error::malformed(address, "chunk index is not an unsigned integer"))?;
        let chunk_count = parts[4]
            .parse::<u32>()
            .map_err(|_| Error::malformed(address, "chunk count is not an unsigned integer"))?;
        if chunk_count == 0 {
            return Err(Error::malformed(address, "chunk count must be positive"));
        }

        Ok(Self {
            frame_id,
            chunk_index,
            chunk_count,
        })
    }

    pub fn with_payload(self, payload: Vec<u8>) -> Fragment {
        Fragment {
            frame_id: self.frame_id,
            chunk_index: self.chunk_index,
            chunk_count: self.chunk_count,
            payload,
        }
    }

    /// Full address under `prefix`, which must itself hold two segments.
    pub fn format(&self, prefix: &str) -> String {
        format!("{}/{}", prefix.trim_end_matches('/'), self)
    }
}

impl fmt::Display for FragmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.frame_id, self.chunk_index, self.chunk_count)
    }
}
