// region:    --- Modules

use std::path::{Path, PathBuf};

use async_std::fs;
use async_std::net::UdpSocket;
use async_std::prelude::*;
use async_std::task;
use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use frame_relay::address::FragmentAddress;
use frame_relay::config::Config;
use frame_relay::{Error, Packet, Result};

// endregion: --- Modules

pub async fn main(udp_service: &UdpSocket, config: &Config) -> Result<()> {
    // region:    --- Loop through sending folder
    let sending_directory = config.sending_directory.as_ref().ok_or_else(|| {
        Error::Config("SENDING_DIRECTORY env var not set".into())
    })?;

    // -- Same seed as the camera firmware: milliseconds / 512
    let mut frame_id = Utc::now().timestamp_millis().unsigned_abs() / 512;
    for path in frame_files(sending_directory).await? {
        let frame = fs::read(&path).await?;
        if frame.is_empty() {
            warn!(path = %path.display(), "skipping empty file");
            continue;
        }

        let mut packets = frame_packets(&config.topic_prefix, frame_id, &frame, config.chunk_size);
        if config.shuffle_chunks {
            packets.shuffle(&mut rand::thread_rng());
        }

        info!(
            "->> Sending {} as frame {} ({} bytes, {} chunks)",
            path.display(),
            frame_id,
            frame.len(),
            packets.len()
        );
        for packet in &packets {
            let packet_bytes = packet.encode()?;
            udp_service.send(&packet_bytes).await?;
            debug!(topic = %packet.topic, bytes = packet.payload.len(), "sent chunk");
        }

        frame_id = frame_id.wrapping_add(1);
        task::sleep(config.delay_per_frame).await;
    }
    // endregion: --- Loop through sending folder

    Ok(())
}

/// Regular files in `dir`, sorted by name.
async fn frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next().await {
        let path: PathBuf = entry?.path().into();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Split `frame` into `chunk_size` slices, each addressed `prefix/frame_id/index/total`.
pub fn frame_packets(prefix: &str, frame_id: u64, frame: &[u8], chunk_size: usize) -> Vec<Packet> {
    let chunks: Vec<&[u8]> = frame.chunks(chunk_size).collect();
    let chunk_count = chunks.len() as u32;

    chunks
        .into_iter()
        .enumerate()
        .map(|(chunk_index, chunk)| {
            let address = FragmentAddress {
                frame_id,
                chunk_index: chunk_index as u32,
                chunk_count,
            };
            Packet::new(address.format(prefix), chunk.to_vec())
        })
        .collect()
}
