// src/lib.rs

//! Taxi: translation package exchange
//!
//! Moves content packages between an S3 bucket and the SFTP servers of
//! translation agencies, through a fixed pipeline of stage directories.
//!
//! # Architecture
//!
//! - Stages: OPEN -> DEPLOY -> DONE; a package's directory location is its state
//! - Packages: dated `.tar.gz` archives locally, `{name}-{from}-{to}-{date}`
//!   directories on the agency server
//! - Backends: narrow traits (`DirectoryBackend`, `ObjectBackend`) with live
//!   SFTP/S3 and in-memory implementations
//! - Transfers: unit-counted, reported through `ProgressTracker`

pub mod compression;
pub mod config;
mod error;
pub mod lifecycle;
pub mod package;
pub mod progress;
pub mod remote;
pub mod stage;
pub mod store;
pub mod transfer;

pub use config::Settings;
pub use error::{Backend, Error, Result};
pub use lifecycle::{DeployReport, DeployedPackage, PackageController, StatusReport};
pub use progress::{
    CallbackProgress, CliProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress,
};
pub use remote::{Agency, RemoteEntry, RemoteSession, Removal};
pub use stage::{Stage, StageRegistry};
pub use store::{ExclusionFilter, ObjectStore};
pub use transfer::{Transfer, TransferSummary};
