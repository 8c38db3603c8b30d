//! Transfer engine configuration.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Tuning knobs for the transfer engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TransferConfig {
    /// Attempts per file when deleting (first try included).
    #[builder(default = "3")]
    #[serde(default = "default_delete_max_attempts")]
    pub delete_max_attempts: u32,

    /// Linear backoff step between delete attempts, in milliseconds.
    #[builder(default = "100")]
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Files deleted concurrently per batch.
    #[builder(default = "5")]
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,

    /// Pause between delete batches, in milliseconds.
    #[builder(default = "150")]
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Age after which trash directories are purged by a sweep.
    #[builder(default = "7")]
    #[serde(default = "default_trash_retention_days")]
    pub trash_retention_days: u32,

    /// How many trashed files are remembered for quick restore.
    #[builder(default = "50")]
    #[serde(default = "default_recent_trash_capacity")]
    pub recent_trash_capacity: usize,

    /// Capacity of the progress channel.
    #[builder(default = "100")]
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// Minimum spacing between progress samples for one file, in milliseconds.
    #[builder(default = "100")]
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Read buffer size for streamed copies.
    #[builder(default = "64 * 1024")]
    #[serde(default = "default_copy_chunk_size")]
    pub copy_chunk_size: usize,

    /// Concurrent transfers allowed per backend host.
    #[builder(default = "4")]
    #[serde(default = "default_max_connections_per_host")]
    pub max_connections_per_host: usize,

    /// Identifier embedded in trash directory names (process id when unset).
    #[builder(default)]
    #[serde(default)]
    pub worker_id: Option<String>,
}

fn default_delete_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_delete_batch_size() -> usize {
    5
}

fn default_batch_pause_ms() -> u64 {
    150
}

fn default_trash_retention_days() -> u32 {
    7
}

fn default_recent_trash_capacity() -> usize {
    50
}

fn default_progress_buffer() -> usize {
    100
}

fn default_progress_interval_ms() -> u64 {
    100
}

fn default_copy_chunk_size() -> usize {
    64 * 1024
}

fn default_max_connections_per_host() -> usize {
    4
}

impl TransferConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.delete_max_attempts == Some(0) {
            return Err("delete_max_attempts must be at least 1".to_string());
        }
        if self.delete_batch_size == Some(0) {
            return Err("delete_batch_size must be at least 1".to_string());
        }
        if self.progress_buffer == Some(0) {
            return Err("progress_buffer must be at least 1".to_string());
        }
        if self.copy_chunk_size == Some(0) {
            return Err("copy_chunk_size must be at least 1".to_string());
        }
        if self.max_connections_per_host == Some(0) {
            return Err("max_connections_per_host must be at least 1".to_string());
        }
        Ok(())
    }
}

impl TransferConfig {
    /// Create a new transfer config builder.
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }

    /// Backoff to wait after the given failed attempt (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms * u64::from(attempt))
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn trash_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.trash_retention_days))
    }

    /// Worker identifier for trash names.
    pub fn worker_id(&self) -> String {
        self.worker_id
            .clone()
            .unwrap_or_else(|| std::process::id().to_string())
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            delete_max_attempts: default_delete_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            delete_batch_size: default_delete_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            trash_retention_days: default_trash_retention_days(),
            recent_trash_capacity: default_recent_trash_capacity(),
            progress_buffer: default_progress_buffer(),
            progress_interval_ms: default_progress_interval_ms(),
            copy_chunk_size: default_copy_chunk_size(),
            max_connections_per_host: default_max_connections_per_host(),
            worker_id: None,
        }
    }
}
