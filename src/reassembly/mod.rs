//! Frame reassembly.
//!
//! A table of per-frame buffers keyed by frame id. The table lock is only
//! taken to look up, create or remove an entry; everything that touches a
//! frame's chunks happens under that frame's own lock, so unrelated frames
//! never wait on each other. Storing an assembled frame is the caller's job
//! and happens after the frame has left the table.

// region:    --- Modules

mod models;

pub use models::{
    AssembledFrame, DiscardReason, EvictedFrame, Fragment, IngestOutcome, Progress,
    ReassemblyEvent, RejectReason,
};

use std::collections::HashMap;
use std::time::Instant;

use async_std::channel::Sender;
use async_std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::ReassemblerConfig;
use crate::{Error, Result};
use models::FrameBuffer;

// endregion: --- Modules

type SharedBuffer = Arc<Mutex<FrameBuffer>>;

struct Slot {
    buffer: SharedBuffer,
    created_at: Instant,
}

enum Completion {
    Pending(Progress),
    Done(AssembledFrame),
}

pub struct Reassembler {
    frames: Mutex<HashMap<u64, Slot>>,
    config: ReassemblerConfig,
    events: Option<Sender<ReassemblyEvent>>,
}

impl Reassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
            config,
            events: None,
        }
    }

    /// Like `new`, also publishing a `ReassemblyEvent` for every state change.
    pub fn with_events(config: ReassemblerConfig, events: Sender<ReassemblyEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }

    /// Add one fragment to its frame and run the completion check in the same critical section.
    pub async fn ingest(&self, fragment: Fragment) -> IngestOutcome {
        let frame_id = fragment.frame_id;
        loop {
            let (buffer, created) = self.buffer_for(frame_id).await;
            let mut frame = buffer.lock().await;
            if frame.retired {
                // -- Frame left the table between lookup and lock; the next lookup starts a fresh one
                continue;
            }

            let chunk_index = fragment.chunk_index;
            let expected = match frame.accept(
                fragment,
                self.config.count_policy,
                self.config.reject_out_of_range,
            ) {
                Ok(expected) => expected,
                Err(reason) => {
                    debug!(frame_id, chunk_index, ?reason, "fragment rejected");
                    if frame.received.is_empty() {
                        frame.retired = true;
                        self.remove_slot(frame_id, &buffer).await;
                    }
                    return IngestOutcome::Rejected { frame_id, reason };
                }
            };
            let outcome = match self
                .complete_locked(frame_id, &buffer, &mut frame, expected)
                .await
            {
                Ok(Completion::Pending(progress)) => IngestOutcome::Pending(progress),
                Ok(Completion::Done(assembled)) => IngestOutcome::Completed(assembled),
                Err(reason) => IngestOutcome::Discarded { frame_id, reason },
            };
            drop(frame);

            // -- Only a frame that actually holds a chunk may push an older one out
            if created && matches!(outcome, IngestOutcome::Pending(_)) {
                self.enforce_cap(frame_id).await;
            }
            return outcome;
        }
    }

    /// Assemble and retire the frame if every chunk is in.
    ///
    /// `Ok(None)` covers unknown frames and frames still waiting for chunks.
    /// A frame whose count matched with a gap in `0..count` is dropped and
    /// reported as `Error::MissingFragment`. `ingest` already runs this check
    /// after every fragment, so through `ingest` alone that state is reported
    /// as `IngestOutcome::Discarded` instead.
    pub async fn check_and_complete(&self, frame_id: u64) -> Result<Option<AssembledFrame>> {
        let Some(buffer) = self.lookup(frame_id).await else {
            return Ok(None);
        };
        let mut frame = buffer.lock().await;
        let Some(expected) = frame.expected_count.filter(|_| !frame.retired) else {
            return Ok(None);
        };

        match self
            .complete_locked(frame_id, &buffer, &mut frame, expected)
            .await
        {
            Ok(Completion::Pending(_)) => Ok(None),
            Ok(Completion::Done(assembled)) => Ok(Some(assembled)),
            Err(DiscardReason::MissingFragment { index }) => {
                Err(Error::MissingFragment { frame_id, index })
            }
        }
    }

    pub async fn progress(&self, frame_id: u64) -> Option<Progress> {
        let buffer = self.lookup(frame_id).await?;
        let frame = buffer.lock().await;
        if frame.retired {
            return None;
        }
        Some(Progress {
            frame_id,
            received: frame.received_count(),
            expected: frame.expected_count?,
        })
    }

    pub async fn pending_frames(&self) -> usize {
        self.frames.lock().await.len()
    }

    /// Drop every frame older than the configured TTL.
    ///
    /// A frame whose lock is held at sweep time is being worked on and is
    /// left for the next sweep.
    pub async fn evict_stale(&self) -> Vec<EvictedFrame> {
        let Some(ttl) = self.config.frame_ttl else {
            return Vec::new();
        };
        let now = Instant::now();

        let evicted: Vec<EvictedFrame> = {
            let mut frames = self.frames.lock().await;
            let stale: Vec<u64> = frames
                .iter()
                .filter(|(_, slot)| now.duration_since(slot.created_at) >= ttl)
                .map(|(frame_id, _)| *frame_id)
                .collect();
            stale
                .into_iter()
                .filter_map(|frame_id| try_evict(&mut frames, frame_id))
                .collect()
        };

        for frame in &evicted {
            self.report_evicted(frame);
        }
        evicted
    }

    // region:    --- Table

    async fn lookup(&self, frame_id: u64) -> Option<SharedBuffer> {
        self.frames
            .lock()
            .await
            .get(&frame_id)
            .map(|slot| Arc::clone(&slot.buffer))
    }

    /// Existing buffer for `frame_id`, or a new empty one. The flag says which.
    async fn buffer_for(&self, frame_id: u64) -> (SharedBuffer, bool) {
        let mut frames = self.frames.lock().await;
        if let Some(slot) = frames.get(&frame_id) {
            return (Arc::clone(&slot.buffer), false);
        }

        let buffer = Arc::new(Mutex::new(FrameBuffer::default()));
        frames.insert(
            frame_id,
            Slot {
                buffer: Arc::clone(&buffer),
                created_at: Instant::now(),
            },
        );
        (buffer, true)
    }

    /// Evict the oldest frames other than `keep` until the table fits the cap.
    async fn enforce_cap(&self, keep: u64) {
        let Some(max) = self.config.max_pending_frames else {
            return;
        };

        let evicted: Vec<EvictedFrame> = {
            let mut frames = self.frames.lock().await;
            let mut candidates: Vec<(Instant, u64)> = frames
                .iter()
                .filter(|(frame_id, _)| **frame_id != keep)
                .map(|(frame_id, slot)| (slot.created_at, *frame_id))
                .collect();
            candidates.sort_unstable();

            let mut evicted = Vec::new();
            for (_, frame_id) in candidates {
                if frames.len() <= max {
                    break;
                }
                if let Some(frame) = try_evict(&mut frames, frame_id) {
                    evicted.push(frame);
                }
            }
            if frames.len() > max {
                debug!(
                    pending = frames.len(),
                    max,
                    "every older frame is busy, over the cap for now"
                );
            }
            evicted
        };

        for frame in &evicted {
            self.report_evicted(frame);
        }
    }

    /// Remove `frame_id` only if the table still points at this very buffer.
    async fn remove_slot(&self, frame_id: u64, buffer: &SharedBuffer) {
        let mut frames = self.frames.lock().await;
        if frames
            .get(&frame_id)
            .is_some_and(|slot| Arc::ptr_eq(&slot.buffer, buffer))
        {
            frames.remove(&frame_id);
        }
    }

    // endregion: --- Table

    // region:    --- Completion

    /// Caller holds `frame`'s lock. Retires the frame once its count is reached.
    async fn complete_locked(
        &self,
        frame_id: u64,
        buffer: &SharedBuffer,
        frame: &mut FrameBuffer,
        expected: u32,
    ) -> core::result::Result<Completion, DiscardReason> {
        let received = frame.received_count();
        if received != expected {
            let progress = Progress {
                frame_id,
                received,
                expected,
            };
            self.publish(ReassemblyEvent::Progress(progress));
            return Ok(Completion::Pending(progress));
        }

        let assembled = frame.assemble(expected);
        frame.retired = true;
        frame.received.clear();
        self.remove_slot(frame_id, buffer).await;

        match assembled {
            Ok(payload) => {
                debug!(frame_id, chunks = expected, bytes = payload.len(), "frame reassembled");
                self.publish(ReassemblyEvent::Completed {
                    frame_id,
                    bytes: payload.len(),
                });
                Ok(Completion::Done(AssembledFrame::new(frame_id, payload)))
            }
            Err(index) => {
                warn!(frame_id, missing = index, "dropping frame with a gap in its chunks");
                let reason = DiscardReason::MissingFragment { index };
                self.publish(ReassemblyEvent::Discarded { frame_id, reason });
                Err(reason)
            }
        }
    }

    fn report_evicted(&self, evicted: &EvictedFrame) {
        warn!(
            frame_id = evicted.frame_id,
            received = evicted.received,
            expected = ?evicted.expected,
            "evicting stalled frame"
        );
        self.publish(ReassemblyEvent::Evicted(*evicted));
    }

    // endregion: --- Completion

    fn publish(&self, event: ReassemblyEvent) {
        if let Some(events) = &self.events {
            // -- Unbounded channel: only fails once the receiver is gone
            let _ = events.try_send(event);
        }
    }
}

/// Caller holds the table lock. Removes and retires `frame_id` in one step,
/// unless someone holds the frame's lock right now.
fn try_evict(frames: &mut HashMap<u64, Slot>, frame_id: u64) -> Option<EvictedFrame> {
    let buffer = Arc::clone(&frames.get(&frame_id)?.buffer);
    let mut frame = buffer.try_lock()?;
    if frame.retired {
        return None;
    }

    frame.retired = true;
    let evicted = EvictedFrame {
        frame_id,
        received: frame.received_count(),
        expected: frame.expected_count,
    };
    frame.received.clear();
    drop(frame);

    frames.remove(&frame_id);
    Some(evicted)
}
