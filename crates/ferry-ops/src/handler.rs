//! Backend handler contract and the per-item loops shared by every handler.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{
    Backend, FileError, Locator, Operation, OperationResult, ResultTally, TransferConfig,
    TransferError,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoint::Endpoints;
use crate::naming::validate_filename;
use crate::progress::{ProgressSink, TransferMeter};

/// Everything a handler needs besides its inputs.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// The operation being executed, as submitted.
    pub operation: Operation,
    pub sink: ProgressSink,
    pub cancel: CancellationToken,
    pub config: Arc<TransferConfig>,
}

impl OperationContext {
    pub fn new(
        operation: Operation,
        sink: ProgressSink,
        cancel: CancellationToken,
        config: Arc<TransferConfig>,
    ) -> Self {
        Self {
            operation,
            sink,
            cancel,
            config,
        }
    }

    fn meter(&self, total_items: usize, total_bytes: u64) -> TransferMeter {
        TransferMeter::new(
            self.sink.clone(),
            total_items,
            total_bytes,
            self.config.progress_interval(),
        )
    }
}

/// Inputs of a copy or move.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub sources: &'a [Locator],
    pub destination: &'a Locator,
    pub overwrite: bool,
    pub credentials_id: Option<&'a str>,
}

/// One handler per backend family; the router picks which one runs.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The backend this handler speaks for.
    fn backend(&self) -> Backend;

    /// Whether a move from `source` to `target` may be attempted as a rename.
    fn renames_in_place(&self, source: &Locator, target: &Locator) -> bool;

    async fn copy(&self, ctx: &OperationContext, request: TransferRequest<'_>) -> OperationResult;

    async fn move_files(
        &self,
        ctx: &OperationContext,
        request: TransferRequest<'_>,
    ) -> OperationResult;

    async fn rename(&self, ctx: &OperationContext, file: &Locator, new_name: &str)
    -> OperationResult;

    async fn delete(
        &self,
        ctx: &OperationContext,
        files: &[Locator],
        soft_delete: bool,
    ) -> OperationResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferMode {
    Copy,
    Move,
}

/// Copy or move every source into the destination, in input order.
pub(crate) async fn run_transfer(
    handler: &dyn OperationHandler,
    endpoints: &Endpoints,
    ctx: &OperationContext,
    request: TransferRequest<'_>,
    mode: TransferMode,
) -> OperationResult {
    let mut tally = ResultTally::new(request.sources.len());

    if let Some(id) = request.credentials_id {
        match endpoints.authorize(request.sources, id).await {
            Ok(()) => {}
            Err(TransferError::AuthenticationRequired { provider, message }) => {
                tally.require_auth(provider, message);
                return tally.finish(ctx.operation.clone());
            }
            Err(err) => return OperationResult::rejected(&ctx.operation, &err),
        }
    }

    if let Err(err) = endpoints.prepare_directory(request.destination).await {
        return OperationResult::rejected(&ctx.operation, &err);
    }

    let total_bytes = endpoints.total_size(request.sources).await;
    let meter = ctx.meter(request.sources.len(), total_bytes);

    for (index, source) in request.sources.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            fail_cancelled(&mut tally, &request.sources[index..]);
            break;
        }

        let name = source.file_name();
        let target = request.destination.join(&name);
        meter.begin_item(&name, index);

        match transfer_one(handler, endpoints, &meter, source, &target, request.overwrite, mode)
            .await
        {
            Ok(bytes) => {
                meter.finish_item(bytes);
                tally.succeed(Some(target));
            }
            Err(TransferError::AuthenticationRequired { provider, message }) => {
                tally.require_auth(provider, message);
                break;
            }
            Err(err) => {
                debug!(%source, %target, error = %err, "item failed");
                tally.fail(FileError::new(source, Some(&target), &err));
            }
        }
    }

    tally.finish(ctx.operation.clone())
}

async fn transfer_one(
    handler: &dyn OperationHandler,
    endpoints: &Endpoints,
    meter: &TransferMeter,
    source: &Locator,
    target: &Locator,
    overwrite: bool,
    mode: TransferMode,
) -> Result<u64, TransferError> {
    let info = endpoints
        .stat(source)
        .await?
        .ok_or_else(|| TransferError::not_found(source))?;

    if is_self_target(source, target).await {
        return Err(TransferError::SelfTarget {
            path: source.to_string(),
        });
    }

    let target_exists = endpoints.exists(target).await?;
    if target_exists && !overwrite {
        return Err(TransferError::already_exists(target));
    }

    // Rename never replaces an existing target
    if mode == TransferMode::Move
        && !target_exists
        && handler.renames_in_place(source, target)
    {
        match endpoints.rename(source, target).await {
            Ok(()) => return Ok(info.size),
            Err(err) => debug!(%source, error = %err, "rename failed, falling back to copy"),
        }
    }

    let progress = |bytes: u64| meter.advance(bytes);
    let bytes = endpoints.copy(source, target, overwrite, &progress).await?;

    if mode == TransferMode::Move {
        if let Err(err) = endpoints.remove(source).await {
            warn!(%source, %target, error = %err, "copied but could not remove source");
            return Err(TransferError::SourceRetained {
                path: source.to_string(),
                source: Box::new(err),
            });
        }
    }

    Ok(bytes)
}

/// Target equals the source, or lies inside it.
///
/// Local paths are resolved first so `..` and symlinked directories
/// cannot alias the source.
async fn is_self_target(source: &Locator, target: &Locator) -> bool {
    if let (Some(from), Some(to)) = (source.to_path(), target.to_path()) {
        let from = resolve_local(from).await;
        let to = resolve_local(to).await;
        return to.starts_with(&from);
    }
    let from = source.as_str().trim_end_matches('/');
    let to = target.as_str();
    to == from || to.strip_prefix(from).is_some_and(|rest| rest.starts_with('/'))
}

/// Canonical form of `path`; for a path that does not exist yet, the
/// canonical parent joined with the final component.
async fn resolve_local(path: PathBuf) -> PathBuf {
    if let Ok(resolved) = tokio::fs::canonicalize(&path).await {
        return resolved;
    }
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return path;
    };
    let parent = match parent.as_os_str().is_empty() {
        true => Path::new("."),
        false => parent,
    };
    let resolved = tokio::fs::canonicalize(parent).await;
    match resolved {
        Ok(parent) => parent.join(name),
        Err(_) => path.clone(),
    }
}

fn fail_cancelled(tally: &mut ResultTally, skipped: &[Locator]) {
    for locator in skipped {
        let err = TransferError::Cancelled {
            path: locator.to_string(),
        };
        tally.fail(FileError::operation(locator, &err));
    }
}

/// Run `attempt` until it succeeds, fails permanently, or runs out of attempts.
///
/// Only retryable errors are retried, with a linearly growing pause.
pub(crate) async fn with_retry<T, F, Fut>(
    config: &TransferConfig,
    item: &str,
    mut attempt: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(err) if err.is_retryable() && tries < config.delete_max_attempts => {
                let delay = config.retry_delay(tries);
                warn!(item, attempt = tries, ?delay, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            result => return result,
        }
    }
}

/// Permanently delete `files` in concurrent batches.
pub(crate) async fn run_hard_delete(
    endpoints: &Endpoints,
    ctx: &OperationContext,
    files: &[Locator],
) -> OperationResult {
    let config = Arc::clone(&ctx.config);
    let mut tally = ResultTally::new(files.len());
    let meter = Arc::new(ctx.meter(files.len(), 0));
    let batch_size = config.delete_batch_size.max(1);

    for (batch_index, batch) in files.chunks(batch_size).enumerate() {
        let offset = batch_index * batch_size;
        if batch_index > 0 {
            tokio::time::sleep(config.batch_pause()).await;
        }
        if ctx.cancel.is_cancelled() {
            fail_cancelled(&mut tally, &files[offset..]);
            break;
        }

        let mut tasks = JoinSet::new();
        for (slot, locator) in batch.iter().enumerate() {
            let endpoints = endpoints.clone();
            let config = Arc::clone(&config);
            let meter = Arc::clone(&meter);
            let locator = locator.clone();
            tasks.spawn(async move {
                let name = locator.file_name();
                meter.begin_item(&name, offset + slot);
                let result = with_retry(&config, &name, || endpoints.remove(&locator)).await;
                if result.is_ok() {
                    meter.finish_item(0);
                }
                (slot, result)
            });
        }

        let mut outcomes: Vec<Option<Result<(), TransferError>>> =
            (0..batch.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => outcomes[slot] = Some(result),
                Err(err) => warn!(error = %err, "delete task failed"),
            }
        }

        let mut auth_required = false;
        for (locator, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Some(Ok(())) => tally.succeed(None),
                Some(Err(TransferError::AuthenticationRequired { provider, message })) => {
                    tally.require_auth(provider, message);
                    auth_required = true;
                }
                Some(Err(err)) => tally.fail(FileError::operation(locator, &err)),
                None => tally.fail(FileError::operation(
                    locator,
                    &TransferError::other("delete task panicked"),
                )),
            }
        }
        if auth_required {
            break;
        }
    }

    tally.finish(ctx.operation.clone())
}

/// Rename one item within its parent.
pub(crate) async fn rename_item(
    endpoints: &Endpoints,
    ctx: &OperationContext,
    file: &Locator,
    new_name: &str,
) -> OperationResult {
    let mut tally = ResultTally::new(1);
    let meter = ctx.meter(1, 0);
    meter.begin_item(&file.file_name(), 0);

    let target = file.with_file_name(new_name);
    match rename_checked(endpoints, file, &target, new_name).await {
        Ok(()) => {
            meter.finish_item(0);
            tally.succeed(Some(target));
        }
        Err(TransferError::AuthenticationRequired { provider, message }) => {
            tally.require_auth(provider, message);
        }
        Err(err) => tally.fail(FileError::new(file, Some(&target), &err)),
    }

    tally.finish(ctx.operation.clone())
}

async fn rename_checked(
    endpoints: &Endpoints,
    file: &Locator,
    target: &Locator,
    new_name: &str,
) -> Result<(), TransferError> {
    validate_filename(new_name)?;

    if !endpoints.exists(file).await? {
        return Err(TransferError::not_found(file));
    }
    if target == file {
        return Ok(());
    }
    if endpoints.exists(target).await? {
        return Err(TransferError::already_exists(target));
    }

    endpoints.rename(file, target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_self_target() {
        assert!(is_self_target(&"/a/dir".into(), &"/a/dir".into()).await);
        assert!(is_self_target(&"/a/dir".into(), &"/a/dir/dir".into()).await);
        assert!(!is_self_target(&"/a/dir".into(), &"/a/dir2/dir".into()).await);
        assert!(
            is_self_target(&"smb://nas/share/x".into(), &"smb://nas/share/x/x".into()).await
        );
        assert!(
            !is_self_target(&"smb://nas/share/x".into(), &"smb://nas/share/xy".into()).await
        );
    }

    #[tokio::test]
    async fn test_self_target_sees_through_parent_links() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("x.txt");
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(&file, "x").unwrap();

        let aliased = dir.path().join("sub").join("..").join("x.txt");
        assert!(is_self_target(&file.as_path().into(), &aliased.as_path().into()).await);

        let sibling = dir.path().join("sub").join("x.txt");
        assert!(!is_self_target(&file.as_path().into(), &sibling.as_path().into()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_until_success() {
        let config = TransferConfig::default();
        let calls = &AtomicU32::new(0);
        let result = with_retry(&config, "a.jpg", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransferError::io(
                    "a.jpg",
                    io::Error::new(io::ErrorKind::ResourceBusy, "locked"),
                ))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let config = TransferConfig::default();
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&config, "a.jpg", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::io(
                "a.jpg",
                io::Error::new(io::ErrorKind::TimedOut, "slow"),
            ))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), config.delete_max_attempts);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let config = TransferConfig::default();
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&config, "a.jpg", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::not_found("a.jpg"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
