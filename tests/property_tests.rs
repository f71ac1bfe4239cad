//! Property tests for arrival order and duplicate delivery.

use async_std::task;
use proptest::prelude::*;

use frame_relay::config::ReassemblerConfig;
use frame_relay::reassembly::{Fragment, IngestOutcome, Reassembler};

/// Chunks of one frame plus an arrival order over their indices.
fn arb_frame() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<usize>)> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 1..12).prop_flat_map(
        |chunks| {
            let order: Vec<usize> = (0..chunks.len()).collect();
            (Just(chunks), Just(order).prop_shuffle())
        },
    )
}

fn fragment(frame_id: u64, chunks: &[Vec<u8>], index: usize) -> Fragment {
    Fragment::new(frame_id, index as u32, chunks.len() as u32, chunks[index].clone())
}

proptest! {
    /// Whatever the arrival order, only the last new chunk completes the
    /// frame and the bytes come out in index order.
    #[test]
    fn any_arrival_order_gives_index_ordered_bytes(
        frame_id in any::<u64>(),
        (chunks, order) in arb_frame(),
    ) {
        let engine = Reassembler::new(ReassemblerConfig::default());
        let outcomes: Vec<IngestOutcome> = task::block_on(async {
            let mut outcomes = Vec::new();
            for &index in &order {
                outcomes.push(engine.ingest(fragment(frame_id, &chunks, index)).await);
            }
            outcomes
        });

        let (last, earlier) = outcomes.split_last().unwrap();
        prop_assert!(earlier.iter().all(|o| matches!(o, IngestOutcome::Pending(_))));
        match last {
            IngestOutcome::Completed(frame) => {
                prop_assert_eq!(frame.frame_id, frame_id);
                prop_assert_eq!(&frame.payload, &chunks.concat());
            }
            other => prop_assert!(false, "expected completion, got {:?}", other),
        }
    }

    /// Re-delivering chunks that already arrived changes nothing.
    #[test]
    fn duplicates_before_completion_are_idempotent(
        (chunks, order) in arb_frame(),
        repeats in proptest::collection::vec(any::<proptest::sample::Index>(), 0..8),
    ) {
        prop_assume!(chunks.len() > 1);
        let (final_index, delivered) = order.split_last().unwrap();

        let engine = Reassembler::new(ReassemblerConfig::default());
        let outcomes: Vec<IngestOutcome> = task::block_on(async {
            let mut outcomes = Vec::new();
            for &index in delivered {
                outcomes.push(engine.ingest(fragment(1, &chunks, index)).await);
            }
            for repeat in &repeats {
                let index = delivered[repeat.index(delivered.len())];
                outcomes.push(engine.ingest(fragment(1, &chunks, index)).await);
            }
            outcomes.push(engine.ingest(fragment(1, &chunks, *final_index)).await);
            outcomes
        });

        let completed: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                IngestOutcome::Completed(frame) => Some(frame),
                _ => None,
            })
            .collect();
        prop_assert_eq!(completed.len(), 1);
        prop_assert_eq!(&completed[0].payload, &chunks.concat());
        prop_assert_eq!(task::block_on(engine.pending_frames()), 0);
    }
}
