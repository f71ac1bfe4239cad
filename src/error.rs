//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Address is not `<prefix>/<prefix>/<frame_id>/<chunk_index>/<chunk_count>`.
    #[error("malformed fragment address `{address}`: {reason}")]
    MalformedFragment {
        address: String,
        reason: &'static str,
    },

    /// The frame reached its chunk count but an index in range never arrived.
    #[error("frame {frame_id} reached its chunk count but chunk {index} is missing")]
    MissingFragment { frame_id: u64, index: u32 },

    #[error("config: {0}")]
    Config(String),

    #[error("packet: {0}")]
    Packet(#[from] bincode::Error),

    #[error("packet padding markers are invalid")]
    BadFraming,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(address: &str, reason: &'static str) -> Self {
        Self::MalformedFragment {
            address: address.to_string(),
            reason,
        }
    }
}
