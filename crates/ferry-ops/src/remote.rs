//! Handler for network and cloud backends.

use async_trait::async_trait;
use ferry_core::{Backend, Locator, OperationResult, TransferError};

use crate::endpoint::Endpoints;
use crate::handler::{
    rename_item, run_hard_delete, run_transfer, OperationContext, OperationHandler,
    TransferMode, TransferRequest,
};

/// Runs operations routed to one network backend.
///
/// Byte movement goes through the endpoint layer, so the other side of a
/// transfer may live on any backend. Soft delete is not available.
#[derive(Debug, Clone)]
pub struct RemoteHandler {
    backend: Backend,
    endpoints: Endpoints,
}

impl RemoteHandler {
    pub fn new(backend: Backend, endpoints: Endpoints) -> Self {
        Self { backend, endpoints }
    }
}

#[async_trait]
impl OperationHandler for RemoteHandler {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn renames_in_place(&self, source: &Locator, target: &Locator) -> bool {
        // server-side rename only works inside one backend
        source.backend() == self.backend && target.backend() == self.backend
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
        if soft_delete {
            return OperationResult::rejected(
                &ctx.operation,
                &TransferError::Unsupported {
                    backend: self.backend,
                    operation: "Soft delete",
                },
            );
        }
        run_hard_delete(&self.endpoints, ctx, files).await
    }
}
