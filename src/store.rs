// region:    --- Modules

use std::path::{Path, PathBuf};

use async_std::fs;
use tracing::info;

use crate::reassembly::AssembledFrame;
use crate::Result;

// endregion: --- Modules

/// Writes reassembled frames into a directory as `frame_{id}_{YYYYmmdd_HHMMSS}.jpg`.
#[derive(Debug, Clone)]
pub struct FrameStore {
    save_dir: PathBuf,
}

impl FrameStore {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.save_dir).await?;
        Ok(())
    }

    pub fn file_name(frame: &AssembledFrame) -> String {
        format!(
            "frame_{}_{}.jpg",
            frame.frame_id,
            frame.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub async fn save(&self, frame: &AssembledFrame) -> Result<PathBuf> {
        let path = self.save_dir.join(Self::file_name(frame));
        fs::write(&path, &frame.payload).await?;
        info!(frame_id = frame.frame_id, path = %path.display(), bytes = frame.payload.len(), "saved reconstructed frame");
        Ok(path)
    }
}
