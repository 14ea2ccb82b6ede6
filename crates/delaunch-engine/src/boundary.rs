use crate::handle::NativeHandle;
use crate::run::{RunHandle, RunObserver, RunRequest};
use crate::EngineError;
use delaunch_schema::{GameConfig, GameId, ModuleDescriptor, ProfileConfig};
use serde::{Deserialize, Serialize};

/// Directory configuration handed to the engine when creating the runtime.
///
/// Paths are opaque strings to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub install_dir: String,
    pub cache_dir: String,
    pub config_dir: String,
    pub launcher_dir: String,
    pub launcher_config_dir: String,
    pub launcher_games_dir: String,
}

/// Native-side information about a game.
///
/// Profile bindings are handles, not proxies: whoever needs the profile
/// looks the handle up through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub identifier: GameId,
    pub title: String,
    pub active_profile: Option<NativeHandle>,
    pub custom_profile: Option<NativeHandle>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub running: bool,
}

/// Expose part of an open file as a directory in the engine VFS without
/// copying it, e.g. a game archive packaged inside the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsMount {
    pub virtual_path: String,
    pub fd: i32,
    pub offset: u64,
    pub length: u64,
}

/// Capability set consumed from the native engine.
///
/// Handles returned by the `list_*` and `default_profile` calls are borrowed:
/// a holder must call [`add_reference`](Self::add_reference) to keep one.
/// Handles from `create_*` carry one reference owned by the caller.
pub trait EngineBoundary: Send + Sync {
    fn name(&self) -> &str;

    /// Load the runtime libraries. Called once per provisioning attempt,
    /// from a worker thread.
    fn load_libraries(&self, config: &EngineConfig) -> Result<(), EngineError>;

    fn create_root(&self, config: &EngineConfig) -> Result<NativeHandle, EngineError>;

    fn destroy_root(&self, root: NativeHandle) -> Result<(), EngineError>;

    fn list_modules(&self, root: NativeHandle) -> Result<Vec<ModuleDescriptor>, EngineError>;

    fn list_games(&self, root: NativeHandle) -> Result<Vec<NativeHandle>, EngineError>;

    fn list_profiles(&self, root: NativeHandle) -> Result<Vec<NativeHandle>, EngineError>;

    fn default_profile(&self, root: NativeHandle) -> Result<Option<NativeHandle>, EngineError>;

    fn game_info(&self, game: NativeHandle) -> Result<GameInfo, EngineError>;

    fn game_status(&self, game: NativeHandle) -> Result<GameStatus, EngineError>;

    fn game_config(&self, game: NativeHandle) -> Result<GameConfig, EngineError>;

    fn set_game_config(&self, game: NativeHandle, config: &GameConfig) -> Result<(), EngineError>;

    /// Bind the active and custom profile of a game. `None` clears a slot.
    fn set_game_profiles(
        &self,
        game: NativeHandle,
        active: Option<NativeHandle>,
        custom: Option<NativeHandle>,
    ) -> Result<(), EngineError>;

    fn profile_config(&self, profile: NativeHandle) -> Result<ProfileConfig, EngineError>;

    fn set_profile_config(
        &self,
        profile: NativeHandle,
        config: &ProfileConfig,
    ) -> Result<(), EngineError>;

    fn create_game(
        &self,
        root: NativeHandle,
        config: &GameConfig,
    ) -> Result<NativeHandle, EngineError>;

    fn create_profile(
        &self,
        root: NativeHandle,
        config: &ProfileConfig,
    ) -> Result<NativeHandle, EngineError>;

    fn add_reference(&self, handle: NativeHandle) -> Result<(), EngineError>;

    fn release(&self, handle: NativeHandle) -> Result<(), EngineError>;

    fn vfs_mount(&self, root: NativeHandle, mount: &VfsMount) -> Result<(), EngineError>;

    /// Start a game. The observer receives state changes and log lines until
    /// the game reports [`crate::RunState::Stopped`].
    fn launch(
        &self,
        root: NativeHandle,
        game: NativeHandle,
        request: &RunRequest,
        observer: RunObserver,
    ) -> Result<Box<dyn RunHandle>, EngineError>;
}
