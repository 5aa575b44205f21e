//! streamplay-ap specific configuration
//!
//! Loaded from TOML (see `streamplay_common::config` for file resolution).
//! Every field has a default so an absent or partial file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STREAMPLAY_CONFIG";

/// Default number of chunks kept queued on the sink ahead of rendering
pub const DEFAULT_JITTER_BUFFER_SIZE: usize = 2;

/// What to do after the output route or device configuration changes.
///
/// The rendering graph is always reconnected first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouteChangePolicy {
    /// Keep playing unless the caller had explicitly paused
    #[default]
    Resume,
    /// Pause a playing stream; the caller resumes it
    Pause,
    /// Stop the stream
    Stop,
}

/// Audio Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Lookahead window of chunks enqueued on the sink
    pub jitter_buffer_size: usize,

    /// Response to route/device configuration changes
    pub route_change_policy: RouteChangePolicy,

    /// Output device name (None = default device)
    pub device_name: Option<String>,

    /// Device buffer size in frames (None = device default)
    pub output_buffer_frames: Option<u32>,

    /// Capacity of the sink's scheduled-chunk queue, in chunks
    pub ring_capacity_chunks: usize,

    /// Capacity of the state event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            jitter_buffer_size: DEFAULT_JITTER_BUFFER_SIZE,
            route_change_policy: RouteChangePolicy::default(),
            device_name: None,
            output_buffer_frames: None,
            ring_capacity_chunks: 64,
            event_channel_capacity: 32,
        }
    }
}

impl PlayerConfig {
    /// Load from the resolved config file (CLI path → env var → platform dir),
    /// falling back to defaults when no file exists.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config: Self = streamplay_common::config::load_or_default(cli_path, CONFIG_ENV_VAR)?;
        config.validate()?;
        info!(
            "Player config: jitter_buffer_size={}, route_change_policy={:?}",
            config.jitter_buffer_size, config.route_change_policy
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jitter_buffer_size == 0 {
            return Err(Error::Config("jitter_buffer_size must be at least 1".to_string()));
        }
        if self.ring_capacity_chunks <= self.jitter_buffer_size {
            return Err(Error::Config(format!(
                "ring_capacity_chunks ({}) must exceed jitter_buffer_size ({})",
                self.ring_capacity_chunks, self.jitter_buffer_size
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
