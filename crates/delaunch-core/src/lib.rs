//! Runtime orchestration for the delaunch launcher.
//!
//! This crate ties the engine boundary, the on-disk store and the schema
//! together: the `Launcher` provisions the engine payload and walks the
//! installation state machine, the `HandleRegistry` wraps native handles in
//! reference-counted proxies, the `CatalogMirror` publishes module, game and
//! profile snapshots, and the `SessionController` resolves profiles and
//! patches into run requests and supervises running games.

pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod lifecycle;
pub mod listeners;
pub mod provisioner;
pub mod registry;
pub mod run;
pub mod session;

pub use catalog::{Catalog, CatalogMirror};
pub use concurrency::{install_signal_handler, request_shutdown, shutdown_requested, InstallLock};
pub use config::LauncherConfig;
pub use lifecycle::{validate_transition, InstallationState};
pub use listeners::{ListenerId, ListenerSet};
pub use provisioner::{Launcher, LauncherHandle, LauncherListener};
pub use registry::{GameProxy, GameSnapshot, HandleRegistry, ManagedProxy, ProfileProxy, ProxyKey};
pub use run::GameRun;
pub use session::{
    compose_arguments, select_patches, validate_game, validate_profile, ModuleProblem,
    ModuleProblemReason, ProfileSource, RejectedProfile, ResolvedProfile, SessionController,
};

use delaunch_engine::NativeHandle;
use delaunch_schema::{GameId, PatchId, ProfileName};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] delaunch_store::StoreError),
    #[error("engine error: {0}")]
    Engine(#[from] delaunch_engine::EngineError),
    #[error("schema error: {0}")]
    Schema(#[from] delaunch_schema::SchemaError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to parse launcher config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to write launcher config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("engine install failed: {0}")]
    InstallFailure(String),
    #[error("engine libraries failed to load: {0}")]
    LibraryLoadFailure(String),
    #[error("engine runtime creation failed: {0}")]
    RuntimeCreateFailure(String),
    #[error("no valid profile for game {0}")]
    NoValidProfile(GameId),
    #[error("no usable profile for game {game}: {}", describe_rejected(.rejected))]
    ProfileResolution {
        game: GameId,
        rejected: Vec<RejectedProfile>,
    },
    #[error("profile not found: {0}")]
    ProfileNotFound(ProfileName),
    #[error("game {game} cannot run: {}", .problems.join("; "))]
    GameNotRunnable { game: GameId, problems: Vec<String> },
    #[error("patch not found: {0}")]
    PatchNotFound(PatchId),
    #[error("engine not ready")]
    NotReady,
    #[error("game already running: {0}")]
    GameAlreadyRunning(GameId),
    #[error("native handle {handle} is not a {expected}")]
    WrongProxyKind {
        handle: NativeHandle,
        expected: &'static str,
    },
    #[error("launcher is busy provisioning")]
    Busy,
    #[error("retry is not possible from state {0}")]
    RetryNotAllowed(InstallationState),
    #[error("lock failed: {0}")]
    LockFailed(String),
    #[error("signal handler: {0}")]
    Signal(String),
}

fn describe_rejected(rejected: &[RejectedProfile]) -> String {
    rejected
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
