//! Core types for ferry.
//!
//! This crate provides the value types shared across the ferry workspace:
//! locators and their backend classification, operations, results, progress
//! events, trash records, errors and configuration.

mod config;
mod error;
mod operation;
mod progress;
mod protocol;
mod result;
mod trash;

pub use config::{TransferConfig, TransferConfigBuilder};
pub use error::{ErrorKind, FileError, TransferError};
pub use operation::{Operation, OperationKind};
pub use progress::ProgressEvent;
pub use protocol::{classify, Backend, ClassifierCache, Locator};
pub use result::{OperationResult, ResultTally};
pub use trash::{
    collision_name, is_trash_dir_name, parse_trash_dir_name, trash_dir_name, trash_timestamp,
    TrashedFile, TRASH_DIR_PREFIX,
};
