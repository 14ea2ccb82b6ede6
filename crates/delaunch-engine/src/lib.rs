//! Native engine boundary for delaunch.
//!
//! The engine itself is an external collaborator reached only through the
//! [`EngineBoundary`] trait: opaque [`NativeHandle`]s for the root launcher,
//! games and profiles, explicit reference counting, configuration getters and
//! setters, a VFS mount for packaged archives, and [`EngineBoundary::launch`]
//! which turns a [`RunRequest`] into a running game. [`MockEngine`] is a
//! complete in-memory implementation used by tests and the reference peer.

pub mod boundary;
pub mod handle;
pub mod mock;
pub mod run;

pub use boundary::{EngineBoundary, EngineConfig, GameInfo, GameStatus, VfsMount};
pub use handle::NativeHandle;
pub use mock::MockEngine;
pub use run::{
    LogSeverity, RunEvent, RunHandle, RunObserver, RunRequest, RunState, SurfaceSize,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime libraries unavailable: {0}")]
    LibraryLoad(String),
    #[error("failed to create launcher runtime: {0}")]
    CreateRuntime(String),
    #[error("invalid native handle: {0}")]
    InvalidHandle(NativeHandle),
    #[error("native handle {handle} is not a {expected}")]
    WrongKind {
        handle: NativeHandle,
        expected: &'static str,
    },
    #[error("engine call failed: {0}")]
    CallFailed(String),
    #[error("game is not running")]
    NotRunning,
}
