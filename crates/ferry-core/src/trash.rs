//! Trash records and the on-disk trash directory naming convention.
//!
//! Soft-deleted files live in `.trash_<timestamp>_<workerId>` directories
//! created next to the original file. `<timestamp>` is nanoseconds since the
//! Unix epoch.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix shared by every trash directory.
pub const TRASH_DIR_PREFIX: &str = ".trash_";

/// A file that was moved into a trash directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashedFile {
    /// Where the file lived before deletion.
    pub original_path: PathBuf,
    /// Where the file lives now.
    pub trash_path: PathBuf,
    /// When it was moved.
    pub deleted_at: DateTime<Utc>,
}

impl TrashedFile {
    pub fn new(original_path: PathBuf, trash_path: PathBuf) -> Self {
        Self {
            original_path,
            trash_path,
            deleted_at: Utc::now(),
        }
    }
}

/// Nanosecond timestamp used in trash names.
pub fn trash_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000))
}

/// Name of a trash directory created at `at` by `worker_id`.
pub fn trash_dir_name(at: DateTime<Utc>, worker_id: &str) -> String {
    format!("{}{}_{}", TRASH_DIR_PREFIX, trash_timestamp(at), worker_id)
}

/// Name used inside a trash directory when `name` is already taken there.
pub fn collision_name(at: DateTime<Utc>, name: &str) -> String {
    format!("{}_{}", trash_timestamp(at), name)
}

/// Creation time encoded in a trash directory name.
pub fn parse_trash_dir_name(name: &str) -> Option<DateTime<Utc>> {
    let rest = name.strip_prefix(TRASH_DIR_PREFIX)?;
    let (timestamp, worker) = rest.split_once('_')?;
    if worker.is_empty() {
        return None;
    }
    let nanos: i64 = timestamp.parse().ok()?;
    Some(DateTime::from_timestamp_nanos(nanos))
}

/// Whether a directory name is a trash directory.
pub fn is_trash_dir_name(name: &str) -> bool {
    parse_trash_dir_name(name).is_some()
}
