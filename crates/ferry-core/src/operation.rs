//! File operation types.

use serde::{Deserialize, Serialize};

use crate::protocol::Locator;

/// A file operation to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Copy files into a destination directory.
    Copy {
        sources: Vec<Locator>,
        destination: Locator,
        overwrite: bool,
        source_credentials_id: Option<String>,
    },
    /// Move files into a destination directory.
    Move {
        sources: Vec<Locator>,
        destination: Locator,
        overwrite: bool,
        source_credentials_id: Option<String>,
    },
    /// Rename a single item in place.
    Rename { file: Locator, new_name: String },
    /// Delete files, either into a trash directory or permanently.
    Delete {
        files: Vec<Locator>,
        soft_delete: bool,
    },
}

/// Which entry point an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Copy,
    Move,
    Rename,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Rename => write!(f, "Rename"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

impl Operation {
    /// Create a copy operation.
    pub fn copy(sources: Vec<Locator>, destination: impl Into<Locator>, overwrite: bool) -> Self {
        Self::Copy {
            sources,
            destination: destination.into(),
            overwrite,
            source_credentials_id: None,
        }
    }

    /// Create a move operation.
    pub fn move_to(sources: Vec<Locator>, destination: impl Into<Locator>, overwrite: bool) -> Self {
        Self::Move {
            sources,
            destination: destination.into(),
            overwrite,
            source_credentials_id: None,
        }
    }

    /// Create a rename operation.
    pub fn rename(file: impl Into<Locator>, new_name: impl Into<String>) -> Self {
        Self::Rename {
            file: file.into(),
            new_name: new_name.into(),
        }
    }

    /// Create a delete operation.
    pub fn delete(files: Vec<Locator>, soft_delete: bool) -> Self {
        Self::Delete { files, soft_delete }
    }

    /// Attach a credentials identifier for the sources of a copy or move.
    pub fn with_credentials(mut self, id: impl Into<String>) -> Self {
        if let Self::Copy {
            source_credentials_id,
            ..
        }
        | Self::Move {
            source_credentials_id,
            ..
        } = &mut self
        {
            *source_credentials_id = Some(id.into());
        }
        self
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Copy { .. } => OperationKind::Copy,
            Self::Move { .. } => OperationKind::Move,
            Self::Rename { .. } => OperationKind::Rename,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Number of input items the result accounts for.
    pub fn total_items(&self) -> usize {
        match self {
            Self::Copy { sources, .. } | Self::Move { sources, .. } => sources.len(),
            Self::Rename { .. } => 1,
            Self::Delete { files, .. } => files.len(),
        }
    }

    /// Every locator the operation touches; the destination comes last.
    pub fn locators(&self) -> Vec<&Locator> {
        match self {
            Self::Copy {
                sources,
                destination,
                ..
            }
            | Self::Move {
                sources,
                destination,
                ..
            } => sources.iter().chain(std::iter::once(destination)).collect(),
            Self::Rename { file, .. } => vec![file],
            Self::Delete { files, .. } => files.iter().collect(),
        }
    }

    /// Destination directory of a copy or move.
    pub fn destination(&self) -> Option<&Locator> {
        match self {
            Self::Copy { destination, .. } | Self::Move { destination, .. } => Some(destination),
            Self::Rename { .. } | Self::Delete { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_items() {
        let op = Operation::copy(vec!["/a".into(), "/b".into()], "/dst", false);
        assert_eq!(op.total_items(), 2);
        assert_eq!(op.locators().len(), 3);
        assert_eq!(Operation::rename("/a", "b").total_items(), 1);
    }

    #[test]
    fn test_with_credentials_only_on_transfers() {
        let op = Operation::copy(vec!["smb://nas/a".into()], "/dst", false).with_credentials("nas");
        assert!(matches!(
            op,
            Operation::Copy { source_credentials_id: Some(ref id), .. } if id == "nas"
        ));

        let op = Operation::delete(vec!["/a".into()], true).with_credentials("nas");
        assert_eq!(op, Operation::delete(vec!["/a".into()], true));
    }
}
