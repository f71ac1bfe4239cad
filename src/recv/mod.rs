// region:    --- Modules

use std::path::PathBuf;
use std::time::Duration;

use async_std::channel::{self, Receiver};
use async_std::net::UdpSocket;
use async_std::sync::Arc;
use async_std::task;
use tracing::{debug, error, info, warn};

use frame_relay::address::FragmentAddress;
use frame_relay::config::Config;
use frame_relay::reassembly::{IngestOutcome, Reassembler, ReassemblyEvent};
use frame_relay::store::FrameStore;
use frame_relay::{Packet, Result};

// endregion: --- Modules

pub async fn main(udp_service: &UdpSocket, config: &Config) -> Result<()> {
    let store = Arc::new(FrameStore::new(config.save_dir.clone()));
    store.ensure_dir().await?;

    let (events_tx, events_rx) = channel::unbounded();
    let engine = Arc::new(Reassembler::with_events(
        config.reassembler.clone(),
        events_tx,
    ));

    task::spawn(report_events(events_rx));
    if engine.config().frame_ttl.is_some() {
        task::spawn(sweep_stale_frames(
            Arc::clone(&engine),
            config.eviction_interval,
        ));
    }

    let mut buffer = vec![0; config.mtu];
    loop {
        let (bytes, peer) = udp_service.recv_from(&mut buffer).await?;
        let datagram = buffer[..bytes].to_vec();

        // -- Hand each datagram to its own task so a slow disk never stalls the socket
        let engine = Arc::clone(&engine);
        let store = Arc::clone(&store);
        task::spawn(async move {
            if let Err(e) = handle_datagram(&engine, &store, &datagram).await {
                warn!(%peer, "datagram not handled: {}", e);
            }
        });
    }
}

/// Decode, address, ingest, and store on completion. Returns the saved path, if any.
pub async fn handle_datagram(
    engine: &Reassembler,
    store: &FrameStore,
    datagram: &[u8],
) -> Result<Option<PathBuf>> {
    let packet = Packet::decode(datagram)?;
    let fragment = FragmentAddress::parse(&packet.topic)?.with_payload(packet.payload);

    match engine.ingest(fragment).await {
        IngestOutcome::Completed(frame) => match store.save(&frame).await {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                // -- The frame already left the engine; these bytes are gone
                error!(frame_id = frame.frame_id, "reassembled frame lost: {}", e);
                Err(e)
            }
        },
        IngestOutcome::Rejected { frame_id, reason } => {
            debug!(frame_id, ?reason, "fragment rejected");
            Ok(None)
        }
        IngestOutcome::Pending(_) | IngestOutcome::Discarded { .. } => Ok(None),
    }
}

async fn report_events(events: Receiver<ReassemblyEvent>) {
    while let Ok(event) = events.recv().await {
        match event {
            ReassemblyEvent::Progress(progress) => debug!(
                frame_id = progress.frame_id,
                "Reconstructing frame {} ({}/{} chunks)",
                progress.frame_id,
                progress.received,
                progress.expected
            ),
            ReassemblyEvent::Completed { frame_id, bytes } => {
                info!(frame_id, bytes, "frame complete")
            }
            ReassemblyEvent::Discarded { frame_id, reason } => {
                warn!(frame_id, ?reason, "frame discarded")
            }
            ReassemblyEvent::Evicted(frame) => warn!(
                frame_id = frame.frame_id,
                received = frame.received,
                expected = ?frame.expected,
                "frame stalled and was evicted"
            ),
        }
    }
}

async fn sweep_stale_frames(engine: Arc<Reassembler>, interval: Duration) {
    loop {
        task::sleep(interval).await;
        let evicted = engine.evict_stale().await;
        if !evicted.is_empty() {
            info!("->> Evicted {} stalled frame(s)", evicted.len());
        }
        let pending = engine.pending_frames().await;
        debug!(pending, "frames still in flight");
    }
}
