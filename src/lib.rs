// region:    --- Modules

pub mod address;
pub mod config;
pub mod error;
pub mod reassembly;
pub mod store;

pub use error::Error;

pub type Result<T> = core::result::Result<T, Error>;

use serde::{Deserialize, Serialize};

// endregion: --- Modules

/*
Packet structure (one UDP datagram per fragment):
    - 0xAA | topic | 0xAA | payload | 0xAA
    topic:   <prefix>/<frame_id>/<chunk_index>/<chunk_count>, e.g. esp32-cam/jpeg/42/0/7
    payload: raw slice of the frame, at most CHUNK_SIZE bytes
*/

pub const PADDING: u8 = 0xAA;

// -- Template for Packet (Maximum MTU)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Packet {
    pub pre_padding: u8,
    pub topic: String,
    pub mid_padding: u8,
    pub payload: Vec<u8>,
    pub post_padding: u8,
}

impl Packet {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            pre_padding: PADDING,
            topic: topic.into(),
            mid_padding: PADDING,
            payload,
            post_padding: PADDING,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialise a datagram, rejecting anything whose padding markers are off.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let packet: Packet = bincode::deserialize(bytes)?;
        if packet.pre_padding != PADDING
            || packet.mid_padding != PADDING
            || packet.post_padding != PADDING
        {
            return Err(Error::BadFraming);
        }
        Ok(packet)
    }
}
