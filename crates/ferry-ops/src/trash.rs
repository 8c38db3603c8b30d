//! Soft delete into per-directory trash folders, restore and retention sweep.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ferry_core::{
    collision_name, is_trash_dir_name, parse_trash_dir_name, trash_dir_name, FileError, Locator,
    OperationResult, ResultTally, TransferConfig, TransferError, TrashedFile,
};
use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::endpoint::{copy_path, remove_path};
use crate::handler::{with_retry, OperationContext};
use crate::naming::restored_path;
use crate::progress::TransferMeter;

/// Outcome of a retention sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Trash directories that were removed.
    pub removed: Vec<PathBuf>,
    /// Trash directories that could not be removed.
    pub errors: Vec<FileError>,
}

struct TrashJob {
    slot: usize,
    locator: Locator,
    path: PathBuf,
    trash_dir: PathBuf,
}

/// Moves local files into trash directories and brings them back.
///
/// Each distinct parent directory gets its own `.trash_<nanos>_<worker>`
/// folder per operation. The most recent trashed files are remembered so the
/// caller can restore them.
#[derive(Debug)]
pub struct TrashManager {
    config: Arc<TransferConfig>,
    worker_id: String,
    sequence: AtomicU64,
    recent: Mutex<VecDeque<TrashedFile>>,
}

impl TrashManager {
    pub fn new(config: Arc<TransferConfig>) -> Self {
        let worker_id = config.worker_id();
        Self {
            config,
            worker_id,
            sequence: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
        }
    }

    fn recent_guard(&self) -> MutexGuard<'_, VecDeque<TrashedFile>> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_dir_name(&self, at: DateTime<Utc>) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        trash_dir_name(at, &format!("{}-{}", self.worker_id, sequence))
    }

    /// Soft-delete `files`. Every locator must be local.
    pub async fn move_to_trash(&self, ctx: &OperationContext, files: &[Locator]) -> OperationResult {
        let config = Arc::clone(&self.config);
        let mut tally = ResultTally::new(files.len());
        let mut outcomes: Vec<Option<Result<PathBuf, TransferError>>> =
            (0..files.len()).map(|_| None).collect();

        // Group by parent, keeping first-seen order
        let mut groups: IndexMap<PathBuf, Vec<(usize, PathBuf)>> = IndexMap::new();
        for (slot, locator) in files.iter().enumerate() {
            let Some(path) = locator.to_path() else {
                outcomes[slot] = Some(Err(TransferError::Unsupported {
                    backend: locator.backend(),
                    operation: "Soft delete",
                }));
                continue;
            };
            if is_in_trash(&path) {
                outcomes[slot] = Some(Err(TransferError::AlreadyTrashed {
                    path: path.display().to_string(),
                }));
                continue;
            }
            let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
            groups.entry(parent).or_default().push((slot, path));
        }

        let now = Utc::now();
        let planned: Vec<PathBuf> = groups
            .keys()
            .map(|parent| parent.join(self.next_dir_name(now)))
            .collect();
        let created = {
            let parents: Vec<PathBuf> = groups.keys().cloned().collect();
            let planned = planned.clone();
            tokio::task::spawn_blocking(move || create_trash_dirs(&parents, &planned))
                .await
                .unwrap_or_default()
        };

        let mut trash_dirs = Vec::with_capacity(planned.len());
        let mut jobs = Vec::new();
        for (((_, members), trash_dir), created) in groups.into_iter().zip(planned).zip(created) {
            match created {
                Ok(()) => {
                    debug!(dir = %trash_dir.display(), files = members.len(), "created trash directory");
                    for (slot, path) in members {
                        jobs.push(TrashJob {
                            slot,
                            locator: files[slot].clone(),
                            path,
                            trash_dir: trash_dir.clone(),
                        });
                    }
                    trash_dirs.push(trash_dir);
                }
                Err(err) => {
                    for (slot, path) in members {
                        outcomes[slot] = Some(Err(match &err {
                            TransferError::NotFound { .. } => {
                                TransferError::not_found(path.display())
                            }
                            other => TransferError::other(format!(
                                "Could not create trash directory: {}",
                                other
                            )),
                        }));
                    }
                }
            }
        }
        jobs.sort_by_key(|job| job.slot);

        let meter = Arc::new(TransferMeter::new(
            ctx.sink.clone(),
            files.len(),
            0,
            config.progress_interval(),
        ));
        let batch_size = config.delete_batch_size.max(1);
        let mut remaining = jobs.into_iter().peekable();
        let mut first_batch = true;

        while remaining.peek().is_some() {
            if !first_batch {
                tokio::time::sleep(config.batch_pause()).await;
            }
            first_batch = false;

            if ctx.cancel.is_cancelled() {
                for job in remaining.by_ref() {
                    outcomes[job.slot] = Some(Err(TransferError::Cancelled {
                        path: job.locator.to_string(),
                    }));
                }
                break;
            }

            let mut tasks = JoinSet::new();
            let mut spawned = Vec::new();
            for job in remaining.by_ref().take(batch_size) {
                spawned.push(job.slot);
                let config = Arc::clone(&config);
                let meter = Arc::clone(&meter);
                tasks.spawn(async move {
                    let name = job.locator.file_name();
                    meter.begin_item(&name, job.slot);
                    let result = with_retry(&config, &name, || {
                        let (path, trash_dir) = (job.path.clone(), job.trash_dir.clone());
                        async move {
                            tokio::task::spawn_blocking(move || trash_one(&path, &trash_dir))
                                .await
                                .map_err(|e| TransferError::other(format!("Task failed: {}", e)))?
                        }
                    })
                    .await;
                    if result.is_ok() {
                        meter.finish_item(0);
                    }
                    (job.slot, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((slot, result)) => outcomes[slot] = Some(result),
                    Err(err) => warn!(error = %err, "trash task failed"),
                }
            }
            for slot in spawned {
                if outcomes[slot].is_none() {
                    outcomes[slot] = Some(Err(TransferError::other("trash task panicked")));
                }
            }
        }

        let mut trashed = Vec::new();
        for (locator, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Some(Ok(trash_path)) => {
                    let original = locator.to_path().unwrap_or_default();
                    tally.succeed(Some(Locator::from(trash_path.as_path())));
                    trashed.push(TrashedFile::new(original, trash_path));
                }
                Some(Err(err)) => tally.fail(FileError::operation(locator, &err)),
                None => tally.fail(FileError::operation(
                    locator,
                    &TransferError::other("not processed"),
                )),
            }
        }

        let cleanup = trash_dirs.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || {
            for dir in cleanup {
                remove_if_empty(&dir);
            }
        })
        .await
        {
            warn!(error = %err, "trash cleanup task failed");
        }

        info!(
            trashed = trashed.len(),
            directories = trash_dirs.len(),
            "moved files to trash"
        );
        self.remember(trashed);

        tally.finish(ctx.operation.clone())
    }

    fn remember(&self, trashed: Vec<TrashedFile>) {
        let capacity = self.config.recent_trash_capacity.max(1);
        let mut recent = self.recent_guard();
        recent.extend(trashed);
        while recent.len() > capacity {
            recent.pop_front();
        }
    }

    /// Recently trashed files, oldest first.
    pub fn recent(&self) -> Vec<TrashedFile> {
        self.recent_guard().iter().cloned().collect()
    }

    /// Move a trashed file back, returning where it landed.
    ///
    /// An occupied original path yields a `_restored` sibling instead.
    pub async fn restore(&self, file: &TrashedFile) -> Result<PathBuf, TransferError> {
        let entry = file.clone();
        let restored = tokio::task::spawn_blocking(move || restore_one(&entry))
            .await
            .map_err(|e| TransferError::other(format!("Task failed: {}", e)))??;

        self.recent_guard()
            .retain(|recent| recent.trash_path != file.trash_path);
        info!(from = %file.trash_path.display(), to = %restored.display(), "restored from trash");
        Ok(restored)
    }

    /// Restore the most recently trashed file, if any.
    pub async fn restore_last(&self) -> Option<Result<PathBuf, TransferError>> {
        let last = self.recent_guard().back().cloned()?;
        Some(self.restore(&last).await)
    }

    /// Delete trash directories under `roots` older than the retention period.
    pub async fn sweep(&self, roots: &[PathBuf]) -> SweepReport {
        self.sweep_at(roots, Utc::now()).await
    }

    /// [`sweep`](Self::sweep) relative to a fixed `now`.
    pub async fn sweep_at(&self, roots: &[PathBuf], now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - self.config.trash_retention();
        self.recent_guard()
            .retain(|entry| entry.deleted_at >= cutoff);

        let roots = roots.to_vec();
        let report = tokio::task::spawn_blocking(move || sweep_roots(&roots, cutoff))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "sweep task failed");
                SweepReport::default()
            });

        info!(
            removed = report.removed.len(),
            failed = report.errors.len(),
            "swept expired trash"
        );
        report
    }
}

fn create_trash_dirs(parents: &[PathBuf], planned: &[PathBuf]) -> Vec<Result<(), TransferError>> {
    parents
        .iter()
        .zip(planned)
        .map(|(parent, trash_dir)| {
            if !parent.is_dir() {
                return Err(TransferError::not_found(parent.display()));
            }
            fs::create_dir(trash_dir).map_err(|e| TransferError::io(trash_dir.display(), e))
        })
        .collect()
}

/// Whether any ancestor of `path` (or the path itself) is a trash directory.
fn is_in_trash(path: &Path) -> bool {
    path.components()
        .any(|component| is_trash_dir_name(&component.as_os_str().to_string_lossy()))
}

fn trash_one(path: &Path, trash_dir: &Path) -> Result<PathBuf, TransferError> {
    let name = path
        .file_name()
        .ok_or_else(|| TransferError::other(format!("{} has no file name", path.display())))?;
    fs::symlink_metadata(path).map_err(|e| TransferError::io(path.display(), e))?;

    let mut target = trash_dir.join(name);
    if target.symlink_metadata().is_ok() {
        target = trash_dir.join(collision_name(Utc::now(), &name.to_string_lossy()));
    }

    if let Err(err) = fs::rename(path, &target) {
        debug!(path = %path.display(), error = %err, "rename into trash failed, copying");
        copy_path(path, &target)?;
        if let Err(err) = remove_path(path) {
            warn!(
                path = %path.display(),
                orphan = %target.display(),
                "copied into trash but could not remove the original"
            );
            return Err(TransferError::SourceRetained {
                path: path.display().to_string(),
                source: Box::new(err),
            });
        }
    }

    Ok(target)
}

fn restore_one(file: &TrashedFile) -> Result<PathBuf, TransferError> {
    fs::symlink_metadata(&file.trash_path)
        .map_err(|e| TransferError::io(file.trash_path.display(), e))?;

    if let Some(parent) = file.original_path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransferError::io(parent.display(), e))?;
    }
    let target = restored_path(&file.original_path);

    if fs::rename(&file.trash_path, &target).is_err() {
        copy_path(&file.trash_path, &target)?;
        if let Err(err) = remove_path(&file.trash_path) {
            warn!(
                path = %file.trash_path.display(),
                error = %err,
                "restored a copy but could not remove the trashed file"
            );
        }
    }

    if let Some(dir) = file.trash_path.parent() {
        remove_if_empty(dir);
    }
    Ok(target)
}

/// Remove `dir` if it is an empty trash directory.
fn remove_if_empty(dir: &Path) {
    let is_trash = dir
        .file_name()
        .is_some_and(|name| is_trash_dir_name(&name.to_string_lossy()));
    if is_trash && fs::remove_dir(dir).is_ok() {
        debug!(dir = %dir.display(), "removed empty trash directory");
    }
}

fn sweep_roots(roots: &[PathBuf], cutoff: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    for root in roots {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) => {
                report.errors.push(FileError::operation(
                    &Locator::from(root.as_path()),
                    &TransferError::io(root.display(), err),
                ));
                continue;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(created) = parse_trash_dir_name(&name.to_string_lossy()) else {
                continue;
            };
            let path = entry.path();
            if created >= cutoff || !path.is_dir() {
                continue;
            }
            match remove_path(&path) {
                Ok(()) => {
                    debug!(dir = %path.display(), "removed expired trash directory");
                    report.removed.push(path);
                }
                Err(err) => report
                    .errors
                    .push(FileError::operation(&Locator::from(path.as_path()), &err)),
            }
        }
    }

    report
}
