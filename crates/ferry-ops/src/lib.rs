//! Transfer engine for ferry.
//!
//! Routes copy, move, rename and delete operations to a handler per backend
//! family, moves bytes between any two backends, keeps soft-deleted files in
//! per-directory trash folders and remembers the last operation for undo.
//! Progress is reported over a bounded channel.

mod endpoint;
mod executor;
mod handler;
mod history;
mod local;
mod naming;
mod progress;
mod remote;
mod router;
mod transport;
mod trash;

pub use endpoint::{ByteProgress, Endpoints, EntryInfo};
pub use executor::TransferEngine;
pub use handler::{OperationContext, OperationHandler, TransferRequest};
pub use history::{undo_plan, HistoryEntry, OperationHistory, UndoPlan};
pub use local::LocalHandler;
pub use naming::{restored_path, validate_filename};
pub use progress::{progress_channel, ProgressSink, TransferMeter};
pub use remote::RemoteHandler;
pub use router::{decide, Route, RouteDecision, RouteInput, Router, ROUTES};
pub use transport::{
    CredentialStore, Credentials, InMemoryCredentials, RemoteEntry, RemoteTransport,
    TransportRegistry,
};
pub use trash::{SweepReport, TrashManager};
