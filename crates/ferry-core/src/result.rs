//! Operation outcomes and per-item bookkeeping.

use serde::{Deserialize, Serialize};

use crate::error::{FileError, TransferError};
use crate::operation::Operation;
use crate::protocol::Locator;

/// Final outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Every input item succeeded.
    Success {
        processed_count: usize,
        operation: Operation,
        produced_paths: Vec<Locator>,
    },
    /// Some items succeeded, some failed.
    PartialSuccess {
        processed_count: usize,
        failed_count: usize,
        errors: Vec<FileError>,
        produced_paths: Vec<Locator>,
    },
    /// Nothing succeeded.
    Failure {
        message: String,
        failed_count: usize,
        errors: Vec<FileError>,
    },
    /// The backend needs (re-)authentication before anything else can succeed.
    AuthenticationRequired {
        provider: String,
        message: String,
        processed_count: usize,
        failed_count: usize,
    },
}

impl OperationResult {
    /// Reject a whole operation before any item was touched.
    pub fn rejected(operation: &Operation, error: &TransferError) -> Self {
        let errors = operation
            .locators()
            .first()
            .map(|locator| vec![FileError::operation(locator, error)])
            .unwrap_or_default();
        Self::Failure {
            message: error.to_string(),
            failed_count: operation.total_items(),
            errors,
        }
    }

    pub fn processed_count(&self) -> usize {
        match self {
            Self::Success {
                processed_count, ..
            }
            | Self::PartialSuccess {
                processed_count, ..
            }
            | Self::AuthenticationRequired {
                processed_count, ..
            } => *processed_count,
            Self::Failure { .. } => 0,
        }
    }

    pub fn failed_count(&self) -> usize {
        match self {
            Self::Success { .. } => 0,
            Self::PartialSuccess { failed_count, .. }
            | Self::Failure { failed_count, .. }
            | Self::AuthenticationRequired { failed_count, .. } => *failed_count,
        }
    }

    /// Per-item errors carried by the result.
    pub fn errors(&self) -> &[FileError] {
        match self {
            Self::PartialSuccess { errors, .. } | Self::Failure { errors, .. } => errors,
            Self::Success { .. } | Self::AuthenticationRequired { .. } => &[],
        }
    }

    /// Paths created by the operation.
    pub fn produced_paths(&self) -> &[Locator] {
        match self {
            Self::Success { produced_paths, .. } | Self::PartialSuccess { produced_paths, .. } => {
                produced_paths
            }
            Self::Failure { .. } | Self::AuthenticationRequired { .. } => &[],
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Get a human-readable summary of the operation.
    pub fn summary(&self) -> String {
        match self {
            Self::Success {
                processed_count, ..
            } => format!("Processed {} items", processed_count),
            Self::PartialSuccess {
                processed_count,
                failed_count,
                ..
            } => format!("Processed {} items, {} failed", processed_count, failed_count),
            Self::Failure { message, .. } => format!("Failed: {}", message),
            Self::AuthenticationRequired {
                provider, message, ..
            } => format!("Authentication required for {}: {}", provider, message),
        }
    }

    /// Combine the outcomes of several operations run as one unit.
    ///
    /// `operation` becomes the recorded operation of a merged success.
    pub fn merge(operation: Operation, results: Vec<OperationResult>) -> Self {
        let mut tally = ResultTally::new(0);
        for result in results {
            match result {
                Self::AuthenticationRequired { .. } => return result,
                Self::Success {
                    processed_count,
                    produced_paths,
                    ..
                } => {
                    tally.total += processed_count;
                    tally.processed += processed_count;
                    tally.produced.extend(produced_paths);
                }
                Self::PartialSuccess {
                    processed_count,
                    failed_count,
                    errors,
                    produced_paths,
                } => {
                    tally.total += processed_count + failed_count;
                    tally.processed += processed_count;
                    tally.extra_failures += failed_count.saturating_sub(errors.len());
                    tally.errors.extend(errors);
                    tally.produced.extend(produced_paths);
                }
                Self::Failure {
                    failed_count,
                    errors,
                    ..
                } => {
                    tally.total += failed_count;
                    let reported = errors.len();
                    tally.errors.extend(errors);
                    tally.extra_failures += failed_count.saturating_sub(reported);
                }
            }
        }
        tally.finish(operation)
    }
}

/// Accumulates per-item outcomes and folds them into an [`OperationResult`].
#[derive(Debug, Default)]
pub struct ResultTally {
    total: usize,
    processed: usize,
    errors: Vec<FileError>,
    // failures counted by merged results without a matching error entry
    extra_failures: usize,
    produced: Vec<Locator>,
    auth: Option<(String, String)>,
}

impl ResultTally {
    /// Start a tally for `total` input items.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// An item succeeded, producing `produced` if anything was created.
    pub fn succeed(&mut self, produced: Option<Locator>) {
        self.processed += 1;
        self.produced.extend(produced);
    }

    /// An item failed.
    pub fn fail(&mut self, error: FileError) {
        self.errors.push(error);
    }

    /// Record an authentication failure that stops the operation.
    pub fn require_auth(&mut self, provider: impl Into<String>, message: impl Into<String>) {
        self.auth = Some((provider.into(), message.into()));
    }

    /// Whether an authentication failure was seen.
    pub fn needs_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn failed(&self) -> usize {
        self.errors.len() + self.extra_failures
    }

    /// Items neither succeeded nor failed yet.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed + self.failed())
    }

    /// Fold into the final result.
    ///
    /// Items never reached (after an authentication short-circuit) count as failed.
    pub fn finish(self, operation: Operation) -> OperationResult {
        let processed_count = self.processed;
        let failed_count = self.total.saturating_sub(processed_count).max(self.failed());

        if let Some((provider, message)) = self.auth {
            return OperationResult::AuthenticationRequired {
                provider,
                message,
                processed_count,
                failed_count,
            };
        }

        if failed_count == 0 {
            OperationResult::Success {
                processed_count,
                operation,
                produced_paths: self.produced,
            }
        } else if processed_count > 0 {
            OperationResult::PartialSuccess {
                processed_count,
                failed_count,
                errors: self.errors,
                produced_paths: self.produced,
            }
        } else {
            let message = match self.errors.first() {
                Some(first) if failed_count == 1 => first.to_string(),
                Some(first) => format!("All {} items failed; first error: {}", failed_count, first),
                None => format!("All {} items failed", failed_count),
            };
            OperationResult::Failure {
                message,
                failed_count,
                errors: self.errors,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> Operation {
        Operation::copy(vec!["/a".into(), "/b".into()], "/dst", false)
    }

    fn not_found(path: &str) -> FileError {
        FileError::new(&Locator::new(path), None, &TransferError::not_found(path))
    }

    #[test]
    fn test_tally_success() {
        let mut tally = ResultTally::new(2);
        tally.succeed(Some("/dst/a".into()));
        tally.succeed(Some("/dst/b".into()));
        let result = tally.finish(op());
        assert!(result.is_success());
        assert_eq!(result.produced_paths().len(), 2);
    }

    #[test]
    fn test_tally_partial() {
        let mut tally = ResultTally::new(2);
        tally.succeed(Some("/dst/a".into()));
        tally.fail(not_found("/b"));
        let result = tally.finish(op());
        assert!(matches!(
            result,
            OperationResult::PartialSuccess {
                processed_count: 1,
                failed_count: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_tally_failure() {
        let mut tally = ResultTally::new(2);
        tally.fail(not_found("/a"));
        tally.fail(not_found("/b"));
        let result = tally.finish(op());
        assert_eq!(result.failed_count(), 2);
        assert!(result.summary().contains("All 2 items failed"));
    }

    #[test]
    fn test_tally_auth_counts_remaining() {
        let mut tally = ResultTally::new(3);
        tally.succeed(None);
        tally.require_auth("SMB", "password rejected");
        let result = tally.finish(op());
        assert_eq!(result.processed_count(), 1);
        assert_eq!(result.failed_count(), 2);
    }

    #[test]
    fn test_rejected_counts_every_item() {
        let result = OperationResult::rejected(&op(), &TransferError::other("nope"));
        assert_eq!(result.failed_count(), 2);
        assert_eq!(result.errors().len(), 1);
    }
}
