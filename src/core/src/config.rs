use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EciError, Result};

/// Bytes forwarded downstream per decode step.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024;

/// Default bound on a single blocking read inside a decode task.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Pull and ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Size of each chunk a decoder forwards downstream
    pub chunk_size: usize,

    /// Chunks buffered between a producer and its decode task
    pub pipe_depth: usize,

    /// Upper bound on one read in a decode task, in seconds (0 = unbounded)
    pub read_timeout_secs: u64,

    /// Buffer size used when copying a fetched blob into a store writer
    pub copy_buffer_size: usize,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pipe_depth: 1,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            copy_buffer_size: 32 * 1024,
        }
    }
}

impl PullConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            EciError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: PullConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&data)?,
            _ => serde_yaml::from_str(&data)?,
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "Loaded pull configuration");
        Ok(config)
    }

    /// Reject values that would stall or spin a transform.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EciError::ConfigError("chunk_size must be > 0".to_string()));
        }
        if self.pipe_depth == 0 {
            return Err(EciError::ConfigError("pipe_depth must be > 0".to_string()));
        }
        if self.copy_buffer_size == 0 {
            return Err(EciError::ConfigError(
                "copy_buffer_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Read bound as a duration; `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
