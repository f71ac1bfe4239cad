use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::config::ChunkCountPolicy;

// region:    --- Inbound

/// One chunk of a frame plus its position and the frame's declared chunk count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub frame_id: u64,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub payload: Vec<u8>,
}

impl Fragment {
    pub fn new(
        frame_id: u64,
        chunk_index: u32,
        chunk_count: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            frame_id,
            chunk_index,
            chunk_count,
            payload: payload.into(),
        }
    }
}

// endregion: --- Inbound

// region:    --- Per-frame state

#[derive(Debug, Default)]
pub(crate) struct FrameBuffer {
    pub(crate) expected_count: Option<u32>,
    pub(crate) received: HashMap<u32, Vec<u8>>,
    /// Set once the buffer has left the table; holders of a stale handle must start over.
    pub(crate) retired: bool,
}

impl FrameBuffer {
    /// Apply one fragment and return the frame's chunk count.
    /// Nothing is mutated when the fragment is rejected.
    pub(crate) fn accept(
        &mut self,
        fragment: Fragment,
        policy: ChunkCountPolicy,
        reject_out_of_range: bool,
    ) -> Result<u32, RejectReason> {
        let threshold = match (policy, self.expected_count) {
            (ChunkCountPolicy::FirstSeen, Some(expected)) => {
                if expected != fragment.chunk_count {
                    tracing::warn!(
                        frame_id = fragment.frame_id,
                        expected,
                        declared = fragment.chunk_count,
                        "ignoring chunk count that disagrees with the frame's first fragment"
                    );
                }
                expected
            }
            _ => fragment.chunk_count,
        };

        if reject_out_of_range && fragment.chunk_index >= threshold {
            return Err(RejectReason::IndexOutOfRange {
                chunk_index: fragment.chunk_index,
                chunk_count: threshold,
            });
        }

        self.expected_count = Some(threshold);
        self.received.insert(fragment.chunk_index, fragment.payload);
        Ok(threshold)
    }

    pub(crate) fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    /// Concatenate chunks `0..expected` in order, or name the first missing index.
    pub(crate) fn assemble(&self, expected: u32) -> Result<Vec<u8>, u32> {
        let size = self.received.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(size);
        for index in 0..expected {
            let chunk = self.received.get(&index).ok_or(index)?;
            payload.extend_from_slice(chunk);
        }
        Ok(payload)
    }
}

// endregion: --- Per-frame state

// region:    --- Outbound

/// A fully reassembled frame, ready for the storage side.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFrame {
    pub frame_id: u64,
    pub generated_at: DateTime<Local>,
    pub payload: Vec<u8>,
}

impl AssembledFrame {
    pub(crate) fn new(frame_id: u64, payload: Vec<u8>) -> Self {
        Self {
            frame_id,
            generated_at: Local::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub frame_id: u64,
    pub received: u32,
    pub expected: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    IndexOutOfRange { chunk_index: u32, chunk_count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    MissingFragment { index: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedFrame {
    pub frame_id: u64,
    pub received: u32,
    pub expected: Option<u32>,
}

/// What a single `ingest` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Pending(Progress),
    Completed(AssembledFrame),
    Rejected {
        frame_id: u64,
        reason: RejectReason,
    },
    Discarded {
        frame_id: u64,
        reason: DiscardReason,
    },
}

/// Non-blocking notifications for observers (progress bars, logs, metrics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    Progress(Progress),
    Completed { frame_id: u64, bytes: usize },
    Discarded { frame_id: u64, reason: DiscardReason },
    Evicted(EvictedFrame),
}

// endregion: --- Outbound
