//! Replay: the pre-flight-gated controller and the hermetic sandbox it
//! activates around event iteration.

mod controller;
mod sandbox;

pub use controller::{ReplayController, ReplayPhase, ReplaySummary};
pub use sandbox::{
    AccessMode, BlockedOperation, DatabaseGuard, FilesystemGuard, GuardedOperation, IpcGuard,
    NetworkGuard, ReplaySandbox, SystemServiceGuard,
};
