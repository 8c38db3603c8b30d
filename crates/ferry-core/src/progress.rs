//! Progress events streamed while an operation runs.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::result::OperationResult;

/// A progress event for one operation invocation.
///
/// Each invocation emits exactly one `Starting` first, any number of
/// `Processing` samples, and exactly one `Completed` last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Emitted before any work starts.
    Starting {
        operation: Operation,
        total_items: usize,
    },
    /// A transfer sample; samples may be dropped when the consumer lags.
    Processing {
        current_item: String,
        /// Zero-based position of the current item among the inputs.
        index: usize,
        total: usize,
        /// Bytes moved so far across the whole operation.
        bytes_transferred: u64,
        /// Bytes the whole operation expects to move (0 if unknown).
        total_bytes: u64,
        speed_bytes_per_second: u64,
    },
    /// The final result.
    Completed { result: OperationResult },
}

impl ProgressEvent {
    /// Get the progress as a percentage (0.0 to 100.0), when known.
    pub fn percentage(&self) -> Option<f64> {
        match self {
            Self::Processing {
                bytes_transferred,
                total_bytes,
                index,
                total,
                ..
            } => {
                if *total_bytes > 0 {
                    Some((*bytes_transferred as f64 / *total_bytes as f64) * 100.0)
                } else if *total > 0 {
                    Some((*index as f64 / *total as f64) * 100.0)
                } else {
                    Some(0.0)
                }
            }
            Self::Starting { .. } => Some(0.0),
            Self::Completed { .. } => Some(100.0),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
