//! Runtime configuration.
//!
//! Values come from the process environment (a `.env` file is loaded by
//! `main` via `dotenv` first). Everything except `MODE` and `LOCAL_ADDRESS`
//! has a default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

// region:    --- Reassembler knobs

/// How a frame's expected chunk count is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCountPolicy {
    /// The first fragment of a frame fixes the count; later disagreements are logged and ignored.
    FirstSeen,
    /// Every fragment re-sets the count.
    Overwrite,
}

impl FromStr for ChunkCountPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "first" | "first_seen" => Ok(Self::FirstSeen),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(Error::Config(format!(
                "CHUNK_COUNT_POLICY must be `first` or `overwrite`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    pub count_policy: ChunkCountPolicy,
    /// Refuse fragments whose index is not below the frame's chunk count.
    pub reject_out_of_range: bool,
    /// Evict frames older than this on the next sweep. `None` keeps them forever.
    pub frame_ttl: Option<Duration>,
    /// Evict the oldest frame when a new one would exceed this many pending frames.
    pub max_pending_frames: Option<usize>,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            count_policy: ChunkCountPolicy::FirstSeen,
            reject_out_of_range: true,
            frame_ttl: Some(Duration::from_secs(30)),
            max_pending_frames: Some(64),
        }
    }
}

// endregion: --- Reassembler knobs

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Send,
    Recv,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "send" => Ok(Self::Send),
            "recv" => Ok(Self::Recv),
            _ => Err(Error::Config(
                "Invalid MODE variable, MODE only operable in RECV or SEND".into(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub local_address: String,
    pub foreign_address: Option<String>,
    pub recv_port: u16,
    pub send_port: u16,
    /// Receive buffer size, one datagram per fragment.
    pub mtu: usize,
    pub save_dir: PathBuf,
    pub sending_directory: Option<PathBuf>,
    pub topic_prefix: String,
    pub chunk_size: usize,
    pub shuffle_chunks: bool,
    pub delay_per_frame: Duration,
    pub eviction_interval: Duration,
    pub reassembler: ReassemblerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mode = required(&var, "MODE")?.parse::<Mode>()?;
        let local_address = required(&var, "LOCAL_ADDRESS")?;

        let frame_ttl_secs: u64 = parsed(&var, "FRAME_TTL_SECS", 30)?;
        let max_pending_frames: usize = parsed(&var, "MAX_PENDING_FRAMES", 64)?;
        let reassembler = ReassemblerConfig {
            count_policy: parsed(&var, "CHUNK_COUNT_POLICY", ChunkCountPolicy::FirstSeen)?,
            reject_out_of_range: parsed(&var, "REJECT_OUT_OF_RANGE", true)?,
            // -- Zero disables the limit
            frame_ttl: (frame_ttl_secs > 0).then(|| Duration::from_secs(frame_ttl_secs)),
            max_pending_frames: (max_pending_frames > 0).then_some(max_pending_frames),
        };

        let config = Self {
            mode,
            local_address,
            foreign_address: var("FOREIGN_ADDRESS"),
            recv_port: parsed(&var, "RECV_PORT", 8001)?,
            send_port: parsed(&var, "SEND_PORT", 8000)?,
            mtu: parsed(&var, "MTU", 9000)?,
            save_dir: var("SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("captured_frames")),
            sending_directory: var("SENDING_DIRECTORY").map(PathBuf::from),
            topic_prefix: var("TOPIC_PREFIX").unwrap_or_else(|| "esp32-cam/jpeg".to_string()),
            chunk_size: parsed(&var, "CHUNK_SIZE", 4096)?,
            shuffle_chunks: parsed(&var, "SHUFFLE_CHUNKS", false)?,
            delay_per_frame: Duration::from_millis(parsed(&var, "DELAY_PER_FRAME_MS", 0)?),
            eviction_interval: Duration::from_secs(parsed(&var, "EVICTION_INTERVAL_SECS", 5)?),
            reassembler,
        };

        if config.chunk_size == 0 || config.chunk_size >= config.mtu {
            return Err(Error::Config(format!(
                "CHUNK_SIZE ({}) must be positive and below MTU ({})",
                config.chunk_size, config.mtu
            )));
        }
        if config.eviction_interval.is_zero() {
            return Err(Error::Config("EVICTION_INTERVAL_SECS must be positive".into()));
        }
        // -- Receivers split addresses into exactly five segments, three of them numeric
        let segments: Vec<&str> = config.topic_prefix.trim_end_matches('/').split('/').collect();
        if segments.len() != 2 || segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::Config(format!(
                "TOPIC_PREFIX `{}` must have exactly two non-empty segments, like `esp32-cam/jpeg`",
                config.topic_prefix
            )));
        }

        Ok(config)
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    var(key).ok_or_else(|| Error::Config(format!("{key} env var not set")))
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match var(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has invalid value `{value}`"))),
        None => Ok(default),
    }
}
