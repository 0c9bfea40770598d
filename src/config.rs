use crate::defaults::{
    INACTIVE_CHECK_RATE, KEY_PREFIX, LOCAL_ROOT, MAX_CHUNK_SAMPLES, MAX_HELD_CHECKPOINTS,
    MIN_FRAME_RATE, S3_REGION, SOURCE_QUEUE_SIZE, TERMINATOR_TIMEOUT_MS,
};
use crate::error::{CallError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub call: CallConfig,
    pub storage: StorageConfig,
    pub source: SourceConfig,
}

/// Call segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CallConfig {
    /// Frames per second below which a channel counts as inactive.
    pub min_frame_rate: f64,
    /// Inactivity sweeps per second.
    pub inactive_check_rate: f64,
    pub terminator_timeout_ms: i64,
    /// Sample capacity of one chunk buffer.
    pub max_chunk_samples: usize,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub region: String,
    pub key_prefix: String,
    pub local_root: PathBuf,
}

/// Storage backend enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

/// Frame stream configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON-lines input file. `None` reads stdin.
    pub path: Option<PathBuf>,
    pub queue_size: usize,
    /// Where the committed stream position is persisted. `None` disables persistence.
    pub checkpoint_path: Option<PathBuf>,
    /// Released records that may wait behind an unreleased one before the run stops.
    pub max_held: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            min_frame_rate: MIN_FRAME_RATE,
            inactive_check_rate: INACTIVE_CHECK_RATE,
            terminator_timeout_ms: TERMINATOR_TIMEOUT_MS,
            max_chunk_samples: MAX_CHUNK_SAMPLES,
        }
    }
}

impl CallConfig {
    /// Milliseconds of silence after which a channel is inactive.
    pub fn inactivity_window_ms(&self) -> i64 {
        (1000.0 / self.min_frame_rate) as i64
    }

    /// Period between inactivity sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis((1000.0 / self.inactive_check_rate) as u64)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket: String::new(),
            region: S3_REGION.to_string(),
            key_prefix: KEY_PREFIX.to_string(),
            local_root: PathBuf::from(LOCAL_ROOT),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            queue_size: SOURCE_QUEUE_SIZE,
            checkpoint_path: None,
            max_held: MAX_HELD_CHECKPOINTS,
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => Err(CallError::ConfigInvalidValue {
                key: "storage.backend".to_string(),
                message: format!("unknown backend '{}' (expected s3, local or memory)", other),
            }),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CallError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                CallError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CallError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CALLSLICER_BUCKET → storage.bucket
    /// - CALLSLICER_KEY_PREFIX → storage.key_prefix
    /// - CALLSLICER_REGION → storage.region
    /// - CALLSLICER_STORAGE_BACKEND → storage.backend
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(bucket) = std::env::var("CALLSLICER_BUCKET")
            && !bucket.is_empty()
        {
            self.storage.bucket = bucket;
        }

        if let Ok(prefix) = std::env::var("CALLSLICER_KEY_PREFIX")
            && !prefix.is_empty()
        {
            self.storage.key_prefix = prefix;
        }

        if let Ok(region) = std::env::var("CALLSLICER_REGION")
            && !region.is_empty()
        {
            self.storage.region = region;
        }

        if let Ok(backend) = std::env::var("CALLSLICER_STORAGE_BACKEND")
            && !backend.is_empty()
        {
            self.storage.backend = backend.parse()?;
        }

        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn is_positive(rate: f64) -> bool {
            rate.is_finite() && rate > 0.0
        }

        fn invalid(key: &str, message: &str) -> CallError {
            CallError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if !is_positive(self.call.min_frame_rate) {
            return Err(invalid("call.min_frame_rate", "must be positive"));
        }
        if !is_positive(self.call.inactive_check_rate) {
            return Err(invalid("call.inactive_check_rate", "must be positive"));
        }
        if self.call.terminator_timeout_ms < 0 {
            return Err(invalid("call.terminator_timeout_ms", "must not be negative"));
        }
        if self.call.max_chunk_samples == 0 {
            return Err(invalid("call.max_chunk_samples", "must be non-zero"));
        }
        if self.source.queue_size == 0 {
            return Err(invalid("source.queue_size", "must be non-zero"));
        }
        if self.source.max_held == 0 {
            return Err(invalid("source.max_held", "must be non-zero"));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.is_empty() {
            return Err(invalid("storage.bucket", "required for the s3 backend"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/callslicer/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("callslicer")
            .join("config.toml")
    }
}
