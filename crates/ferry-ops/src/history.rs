//! Single-slot operation history and inverse planning for undo.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ferry_core::{Locator, Operation, OperationResult};
use indexmap::IndexMap;

/// The most recent completed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub operation: Operation,
    pub result: OperationResult,
    pub timestamp: DateTime<Utc>,
    /// This entry was produced by an undo and cannot itself be undone.
    pub is_undo: bool,
}

impl HistoryEntry {
    pub fn new(operation: Operation, result: OperationResult, is_undo: bool) -> Self {
        Self {
            operation,
            result,
            timestamp: Utc::now(),
            is_undo,
        }
    }

    /// Whether an inverse can be planned for this entry.
    pub fn can_undo(&self) -> bool {
        undo_plan(self).is_some()
    }

    /// Get a description of how to undo this operation.
    pub fn undo_description(&self) -> Option<String> {
        let plan = undo_plan(self)?;
        Some(match &self.operation {
            Operation::Copy { .. } => {
                format!("Delete {} copied items", self.result.produced_paths().len())
            }
            Operation::Move { .. } => format!(
                "Move {} items back to {} original locations",
                self.result.produced_paths().len(),
                plan.operations.len()
            ),
            Operation::Rename { file, .. } => format!("Rename back to '{}'", file.file_name()),
            Operation::Delete { .. } => return None,
        })
    }
}

/// Inverse operations for a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPlan {
    pub operations: Vec<Operation>,
    /// Must still exist for the plan to run.
    pub requires: Option<Locator>,
}

/// Build the inverse of `entry`, if it has one.
///
/// Only items the original operation produced are reversed. Deletes are not
/// reversed here; soft-deleted files come back through the trash manager.
pub fn undo_plan(entry: &HistoryEntry) -> Option<UndoPlan> {
    if entry.is_undo {
        return None;
    }
    let produced = entry.result.produced_paths();
    if produced.is_empty() {
        return None;
    }

    match &entry.operation {
        Operation::Copy { .. } => Some(UndoPlan {
            operations: vec![Operation::delete(produced.to_vec(), false)],
            requires: None,
        }),
        Operation::Move { sources, .. } => {
            // each produced path is `destination/<name>`; send it back to the
            // parent of the source with the same name
            let mut by_parent: IndexMap<Locator, Vec<Locator>> = IndexMap::new();
            for moved in produced {
                let name = moved.file_name();
                let Some(origin) = sources.iter().find(|source| source.file_name() == name)
                else {
                    continue;
                };
                if let Some(parent) = origin.parent() {
                    by_parent.entry(parent).or_default().push(moved.clone());
                }
            }
            if by_parent.is_empty() {
                return None;
            }
            Some(UndoPlan {
                operations: by_parent
                    .into_iter()
                    .map(|(parent, files)| Operation::move_to(files, parent, true))
                    .collect(),
                requires: None,
            })
        }
        Operation::Rename { file, .. } => {
            let renamed = produced.first()?.clone();
            Some(UndoPlan {
                operations: vec![Operation::rename(renamed.clone(), file.file_name())],
                requires: Some(renamed),
            })
        }
        Operation::Delete { .. } => None,
    }
}

/// Holds at most one entry; every new operation replaces it.
#[derive(Debug, Default)]
pub struct OperationHistory {
    slot: Mutex<Option<HistoryEntry>>,
}

impl OperationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Option<HistoryEntry>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, entry: HistoryEntry) {
        *self.guard() = Some(entry);
    }

    pub fn last(&self) -> Option<HistoryEntry> {
        self.guard().clone()
    }

    pub fn clear(&self) {
        *self.guard() = None;
    }

    pub fn can_undo(&self) -> bool {
        self.guard().as_ref().is_some_and(HistoryEntry::can_undo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(operation: &Operation, produced: &[&str]) -> OperationResult {
        OperationResult::Success {
            processed_count: produced.len(),
            operation: operation.clone(),
            produced_paths: produced.iter().map(|p| Locator::new(*p)).collect(),
        }
    }

    #[test]
    fn test_copy_undo_deletes_produced() {
        let op = Operation::copy(vec!["/a/x.jpg".into()], "/b", false);
        let entry = HistoryEntry::new(op.clone(), success(&op, &["/b/x.jpg"]), false);
        let plan = undo_plan(&entry).unwrap();
        assert_eq!(
            plan.operations,
            vec![Operation::delete(vec!["/b/x.jpg".into()], false)]
        );
        assert_eq!(
            entry.undo_description().as_deref(),
            Some("Delete 1 copied items")
        );
    }

    #[test]
    fn test_move_undo_groups_by_original_parent() {
        let op = Operation::move_to(
            vec!["/a/1.jpg".into(), "/c/2.jpg".into(), "/a/3.jpg".into()],
            "/dst",
            false,
        );
        let entry = HistoryEntry::new(
            op.clone(),
            success(&op, &["/dst/1.jpg", "/dst/2.jpg", "/dst/3.jpg"]),
            false,
        );
        let plan = undo_plan(&entry).unwrap();
        assert_eq!(plan.operations.len(), 2);
        assert_eq!(
            entry.undo_description().as_deref(),
            Some("Move 3 items back to 2 original locations")
        );
        assert_eq!(
            plan.operations[0],
            Operation::move_to(vec!["/dst/1.jpg".into(), "/dst/3.jpg".into()], "/a", true)
        );
        assert_eq!(
            plan.operations[1],
            Operation::move_to(vec!["/dst/2.jpg".into()], "/c", true)
        );
    }

    #[test]
    fn test_rename_undo_requires_renamed_file() {
        let op = Operation::rename("/a/old.txt", "new.txt");
        let entry = HistoryEntry::new(op.clone(), success(&op, &["/a/new.txt"]), false);
        let plan = undo_plan(&entry).unwrap();
        assert_eq!(plan.requires, Some(Locator::new("/a/new.txt")));
        assert_eq!(
            plan.operations,
            vec![Operation::rename("/a/new.txt", "old.txt")]
        );
    }

    #[test]
    fn test_not_undoable() {
        let op = Operation::delete(vec!["/a".into()], true);
        let entry = HistoryEntry::new(op.clone(), success(&op, &["/.trash_1_w/a"]), false);
        assert!(!entry.can_undo());

        let op = Operation::copy(vec!["/a".into()], "/b", false);
        let undo = HistoryEntry::new(op.clone(), success(&op, &["/b/a"]), true);
        assert!(!undo.can_undo());

        let failed = HistoryEntry::new(
            op,
            OperationResult::Failure {
                message: "x".into(),
                failed_count: 1,
                errors: vec![],
            },
            false,
        );
        assert!(!failed.can_undo());
    }

    #[test]
    fn test_history_holds_one_entry() {
        let history = OperationHistory::new();
        let op = Operation::copy(vec!["/a".into()], "/b", false);
        history.record(HistoryEntry::new(op.clone(), success(&op, &["/b/a"]), false));
        assert!(history.can_undo());

        history.record(HistoryEntry::new(op.clone(), success(&op, &["/b/a"]), true));
        assert!(!history.can_undo());
        assert!(history.last().unwrap().is_undo);

        history.clear();
        assert!(history.last().is_none());
    }
}
