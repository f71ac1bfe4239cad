//! End-to-end reassembly behaviour through the public engine API,
//! including concurrent delivery from many tasks.

use std::time::Duration;

use async_std::channel;
use async_std::sync::Arc;
use async_std::task;

use frame_relay::address::FragmentAddress;
use frame_relay::config::ReassemblerConfig;
use frame_relay::reassembly::{
    AssembledFrame, Fragment, IngestOutcome, Progress, Reassembler, ReassemblyEvent,
};

fn engine() -> Arc<Reassembler> {
    Arc::new(Reassembler::new(ReassemblerConfig {
        frame_ttl: None,
        max_pending_frames: None,
        ..ReassemblerConfig::default()
    }))
}

fn completions(outcomes: Vec<IngestOutcome>) -> Vec<AssembledFrame> {
    outcomes
        .into_iter()
        .filter_map(|outcome| match outcome {
            IngestOutcome::Completed(frame) => Some(frame),
            _ => None,
        })
        .collect()
}

fn chunk(frame_id: u64, index: u32) -> Vec<u8> {
    format!("[{frame_id}:{index:03}]").into_bytes()
}

fn expected_payload(frame_id: u64, count: u32) -> Vec<u8> {
    (0..count).flat_map(|index| chunk(frame_id, index)).collect()
}

#[async_std::test]
async fn scenario_out_of_order_three_chunks() {
    let engine = engine();
    let mut outcomes = Vec::new();
    for (index, payload) in [(0, "AAA"), (2, "CCC"), (1, "BBB")] {
        outcomes.push(engine.ingest(Fragment::new(7, index, 3, payload)).await);
    }
    let frames = completions(outcomes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, b"AAABBBCCC");
}

#[async_std::test]
async fn scenario_duplicate_first_chunk() {
    let engine = engine();
    let mut outcomes = Vec::new();
    outcomes.push(engine.ingest(Fragment::new(9, 0, 2, "X")).await);
    outcomes.push(engine.ingest(Fragment::new(9, 0, 2, "X")).await);
    outcomes.push(engine.ingest(Fragment::new(9, 1, 2, "Y")).await);
    let frames = completions(outcomes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, b"XY");
}

#[async_std::test]
async fn scenario_incomplete_frame_only_reports_progress() {
    let (tx, rx) = channel::unbounded();
    let engine = Reassembler::with_events(ReassemblerConfig::default(), tx);
    engine.ingest(Fragment::new(3, 0, 5, "A")).await;

    let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        events,
        vec![ReassemblyEvent::Progress(Progress {
            frame_id: 3,
            received: 1,
            expected: 5,
        })]
    );
    assert_eq!(engine.check_and_complete(3).await.unwrap(), None);
}

#[async_std::test]
async fn parsed_addresses_feed_the_engine() {
    let engine = engine();
    let topics = ["esp32-cam/jpeg/55/1/2", "esp32-cam/jpeg/55/0/2"];
    let mut outcomes = Vec::new();
    for (topic, payload) in topics.iter().zip(["tail", "head-"]) {
        let fragment = FragmentAddress::parse(topic)
            .unwrap()
            .with_payload(payload.as_bytes().to_vec());
        outcomes.push(engine.ingest(fragment).await);
    }
    assert_eq!(completions(outcomes)[0].payload, b"head-tail");
}

#[async_std::test]
async fn racing_chunks_of_one_frame_complete_exactly_once() {
    let engine = engine();
    let count = 64;

    // -- Even indices are delivered twice; a late copy can open a new buffer that never fills
    let deliveries: Vec<u32> = (0..count)
        .flat_map(|index| if index % 2 == 0 { vec![index, index] } else { vec![index] })
        .collect();

    let handles: Vec<_> = deliveries
        .into_iter()
        .map(|index| {
            let engine = Arc::clone(&engine);
            task::spawn(async move { engine.ingest(Fragment::new(1, index, count, chunk(1, index))).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await);
    }

    let frames = completions(outcomes);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, expected_payload(1, count));
}

#[async_std::test]
async fn interleaved_frames_never_mix_chunks() {
    let engine = engine();
    let frames: Vec<u64> = (100..108).collect();
    let count = 16;

    let handles: Vec<_> = (0..count)
        .rev()
        .flat_map(|index| frames.iter().map(move |frame_id| (*frame_id, index)))
        .map(|(frame_id, index)| {
            let engine = Arc::clone(&engine);
            task::spawn(async move {
                engine
                    .ingest(Fragment::new(frame_id, index, count, chunk(frame_id, index)))
                    .await
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await);
    }

    let mut done = completions(outcomes);
    done.sort_by_key(|frame| frame.frame_id);
    assert_eq!(done.len(), frames.len());
    for (frame, frame_id) in done.iter().zip(&frames) {
        assert_eq!(frame.frame_id, *frame_id);
        assert_eq!(frame.payload, expected_payload(*frame_id, count));
    }
    assert_eq!(engine.pending_frames().await, 0);
}

#[async_std::test]
async fn stalled_frame_does_not_block_other_frames() {
    let engine = engine();
    engine.ingest(Fragment::new(1, 0, 3, "stalled")).await;

    let finished = async_std::future::timeout(Duration::from_secs(5), async {
        engine.ingest(Fragment::new(2, 1, 2, "B")).await;
        engine.ingest(Fragment::new(2, 0, 2, "A")).await
    })
    .await
    .expect("frame 2 should not wait on frame 1");

    assert!(matches!(finished, IngestOutcome::Completed(ref frame) if frame.payload == b"AB"));
    assert_eq!(engine.progress(1).await.map(|p| p.received), Some(1));
}
