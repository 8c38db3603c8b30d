//! Transfer engine: routing, dispatch, progress and history in one place.

use std::sync::Arc;

use ferry_core::{
    Backend, Operation, OperationResult, ProgressEvent, TransferConfig, TransferError,
};
use indexmap::IndexMap;
use strum::IntoEnumIterator;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::endpoint::Endpoints;
use crate::handler::{OperationContext, OperationHandler, TransferRequest};
use crate::history::{undo_plan, HistoryEntry, OperationHistory};
use crate::local::LocalHandler;
use crate::progress::{progress_channel, ProgressSink};
use crate::remote::RemoteHandler;
use crate::router::Router;
use crate::transport::TransportRegistry;
use crate::trash::TrashManager;

/// Entry point for running operations.
///
/// Cheap to clone; clones share the registry, trash manager and history.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: Arc<TransferConfig>,
    endpoints: Endpoints,
    router: Router,
    trash: Arc<TrashManager>,
    local: LocalHandler,
    remotes: IndexMap<Backend, RemoteHandler>,
    history: OperationHistory,
}

impl TransferEngine {
    /// Create an engine over a shared transport registry.
    pub fn new(config: TransferConfig, registry: Arc<TransportRegistry>) -> Self {
        let config = Arc::new(config);
        let endpoints = Endpoints::new(registry, config.copy_chunk_size);
        let trash = Arc::new(TrashManager::new(Arc::clone(&config)));
        let local = LocalHandler::new(endpoints.clone(), Arc::clone(&trash));
        let remotes = Backend::iter()
            .filter(|backend| backend.is_network())
            .map(|backend| (backend, RemoteHandler::new(backend, endpoints.clone())))
            .collect();

        Self {
            inner: Arc::new(EngineInner {
                config,
                endpoints,
                router: Router::new(),
                trash,
                local,
                remotes,
                history: OperationHistory::new(),
            }),
        }
    }

    /// Create an engine with no remote transports.
    pub fn local(config: TransferConfig) -> Self {
        let registry = Arc::new(TransportRegistry::new(config.max_connections_per_host));
        Self::new(config, registry)
    }

    pub fn config(&self) -> &TransferConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &TransportRegistry {
        self.inner.endpoints.registry()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Trash manager for restore, recent files and sweeping.
    pub fn trash(&self) -> &TrashManager {
        &self.inner.trash
    }

    /// Run `operation` to completion.
    pub async fn execute(&self, operation: Operation) -> OperationResult {
        self.execute_with_token(operation, CancellationToken::new())
            .await
    }

    /// Run `operation` to completion, stopping early if `cancel` fires.
    pub async fn execute_with_token(
        &self,
        operation: Operation,
        cancel: CancellationToken,
    ) -> OperationResult {
        let inner = Arc::clone(&self.inner);
        let submitted = operation.clone();
        let handle = tokio::spawn(async move {
            inner
                .run(operation, ProgressSink::disabled(), cancel, true)
                .await
        });
        match handle.await {
            Ok(result) => result,
            Err(err) => OperationResult::rejected(
                &submitted,
                &TransferError::other(format!("Task failed: {}", err)),
            ),
        }
    }

    /// Start `operation` and stream its progress.
    ///
    /// The stream yields `Starting` first and `Completed` last.
    pub fn execute_with_progress(&self, operation: Operation) -> ReceiverStream<ProgressEvent> {
        self.execute_with_cancel(operation, CancellationToken::new())
    }

    /// Like [`execute_with_progress`](Self::execute_with_progress), with cancellation.
    pub fn execute_with_cancel(
        &self,
        operation: Operation,
        cancel: CancellationToken,
    ) -> ReceiverStream<ProgressEvent> {
        let (sink, rx) = progress_channel(self.inner.config.progress_buffer);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(operation, sink, cancel, true).await;
        });
        ReceiverStream::new(rx)
    }

    pub fn can_undo(&self) -> bool {
        self.inner.history.can_undo()
    }

    pub fn last_operation(&self) -> Option<HistoryEntry> {
        self.inner.history.last()
    }

    pub fn clear_history(&self) {
        self.inner.history.clear();
    }

    /// Reverse the last operation.
    ///
    /// Returns `None` when there is nothing to undo. The undo itself becomes
    /// the last operation and cannot be undone.
    pub async fn undo(&self) -> Option<OperationResult> {
        let entry = self.inner.history.last()?;
        let plan = undo_plan(&entry)?;
        let first = plan.operations.first()?.clone();

        if let Some(required) = &plan.requires {
            if !self.inner.endpoints.exists(required).await.unwrap_or(false) {
                let result =
                    OperationResult::rejected(&first, &TransferError::not_found(required));
                self.inner
                    .history
                    .record(HistoryEntry::new(first, result.clone(), true));
                return Some(result);
            }
        }

        let mut results = Vec::with_capacity(plan.operations.len());
        for operation in plan.operations {
            let result = self
                .inner
                .run(
                    operation,
                    ProgressSink::disabled(),
                    CancellationToken::new(),
                    false,
                )
                .await;
            results.push(result);
        }
        let result = if results.len() == 1 {
            results.remove(0)
        } else {
            OperationResult::merge(first.clone(), results)
        };

        info!(summary = %result.summary(), "undo finished");
        self.inner
            .history
            .record(HistoryEntry::new(first, result.clone(), true));
        Some(result)
    }
}

impl EngineInner {
    fn handler(&self, backend: Backend) -> &dyn OperationHandler {
        if let Some(remote) = self.remotes.get(&backend) {
            return remote;
        }
        &self.local
    }

    async fn run(
        &self,
        operation: Operation,
        sink: ProgressSink,
        cancel: CancellationToken,
        record: bool,
    ) -> OperationResult {
        sink.starting(&operation).await;

        let ctx = OperationContext::new(
            operation.clone(),
            sink.clone(),
            cancel,
            Arc::clone(&self.config),
        );
        let result = self.dispatch(&ctx).await;

        match &result {
            OperationResult::Failure { message, .. } => {
                warn!(kind = %operation.kind(), %message, "operation failed")
            }
            other => info!(
                kind = %operation.kind(),
                processed = other.processed_count(),
                failed = other.failed_count(),
                "operation finished"
            ),
        }

        if record {
            self.history
                .record(HistoryEntry::new(operation, result.clone(), false));
        }
        sink.completed(&result).await;
        result
    }

    async fn dispatch(&self, ctx: &OperationContext) -> OperationResult {
        let operation = &ctx.operation;

        // soft delete mixing in any non-local locator touches nothing
        if let Operation::Delete {
            files,
            soft_delete: true,
        } = operation
        {
            if let Some(foreign) = files.iter().find(|file| !file.is_local()) {
                return OperationResult::rejected(
                    operation,
                    &TransferError::Unsupported {
                        backend: foreign.backend(),
                        operation: "Soft delete",
                    },
                );
            }
        }

        let decision = self.router.route(operation);
        let handler = self.handler(decision.handler);

        match operation {
            Operation::Copy {
                sources,
                destination,
                overwrite,
                source_credentials_id,
            } => {
                let request = TransferRequest {
                    sources,
                    destination,
                    overwrite: *overwrite,
                    credentials_id: source_credentials_id.as_deref(),
                };
                handler.copy(ctx, request).await
            }
            Operation::Move {
                sources,
                destination,
                overwrite,
                source_credentials_id,
            } => {
                let request = TransferRequest {
                    sources,
                    destination,
                    overwrite: *overwrite,
                    credentials_id: source_credentials_id.as_deref(),
                };
                handler.move_files(ctx, request).await
            }
            Operation::Rename { file, new_name } => handler.rename(ctx, file, new_name).await,
            Operation::Delete { files, soft_delete } => {
                handler.delete(ctx, files, *soft_delete).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_every_network_backend_has_a_handler() {
        let engine = TransferEngine::local(TransferConfig::default());
        for backend in Backend::iter() {
            let handler = engine.inner.handler(backend);
            if backend.is_network() {
                assert_eq!(handler.backend(), backend);
            } else {
                assert_eq!(handler.backend(), Backend::Local);
            }
        }
    }

    #[tokio::test]
    async fn test_copy_then_undo() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, "hello").unwrap();
        let dst = dir.path().join("out");

        let engine = TransferEngine::local(TransferConfig::default());
        let result = engine
            .execute(Operation::copy(vec![src.as_path().into()], dst.as_path(), false))
            .await;
        assert!(result.is_success());
        assert!(dst.join("a.txt").exists());
        assert!(engine.can_undo());

        let undone = engine.undo().await.unwrap();
        assert!(undone.is_success());
        assert!(!dst.join("a.txt").exists());
        assert!(src.exists());

        // an undo is never undoable
        assert!(!engine.can_undo());
        assert!(engine.undo().await.is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_with_remote_locator_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("a.txt");
        fs::write(&local, "x").unwrap();

        let engine = TransferEngine::local(TransferConfig::default());
        let result = engine
            .execute(Operation::delete(
                vec![local.as_path().into(), "smb://nas/share/b.txt".into()],
                true,
            ))
            .await;

        assert_eq!(result.failed_count(), 2);
        assert_eq!(result.errors()[0].kind, ErrorKind::Unsupported);
        assert!(local.exists());
    }
}
