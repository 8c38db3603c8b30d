//! Handler for local paths and scoped storage.

use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{Backend, Locator, OperationResult, TransferError};

use crate::endpoint::Endpoints;
use crate::handler::{
    rename_item, run_hard_delete, run_transfer, OperationContext, OperationHandler,
    TransferMode, TransferRequest,
};
use crate::trash::TrashManager;

/// Runs operations whose locators are all local or scoped.
///
/// Moves between two local paths are renames when possible. Soft deletes go
/// through the shared [`TrashManager`].
#[derive(Debug, Clone)]
pub struct LocalHandler {
    endpoints: Endpoints,
    trash: Arc<TrashManager>,
}

impl LocalHandler {
    pub fn new(endpoints: Endpoints, trash: Arc<TrashManager>) -> Self {
        Self { endpoints, trash }
    }
}

#[async_trait]
impl OperationHandler for LocalHandler {
    fn backend(&self) -> Backend {
        Backend::Local
    }

    fn renames_in_place(&self, source: &Locator, target: &Locator) -> bool {
        source.is_local() && target.is_local()
    }

    async fn copy(&self, ctx: &OperationContext, request: TransferRequest<'_>) -> OperationResult {
        run_transfer(self, &self.endpoints, ctx, request, TransferMode::Copy).await
    }

    async fn move_files(
        &self,
        ctx: &OperationContext,
        request: TransferRequest<'_>,
    ) -> OperationResult {
        run_transfer(self, &self.endpoints, ctx, request, TransferMode::Move).await
    }

    async fn rename(
        &self,
        ctx: &OperationContext,
        file: &Locator,
        new_name: &str,
    ) -> OperationResult {
        rename_item(&self.endpoints, ctx, file, new_name).await
    }

    async fn delete(
        &self,
        ctx: &OperationContext,
        files: &[Locator],
        soft_delete: bool,
    ) -> OperationResult {
        if !soft_delete {
            return run_hard_delete(&self.endpoints, ctx, files).await;
        }

        if let Some(foreign) = files.iter().find(|file| !file.is_local()) {
            return OperationResult::rejected(
                &ctx.operation,
                &TransferError::Unsupported {
                    backend: foreign.backend(),
                    operation: "Soft delete",
                },
            );
        }
        self.trash.move_to_trash(ctx, files).await
    }
}
