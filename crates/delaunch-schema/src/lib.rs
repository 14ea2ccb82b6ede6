//! Plain data shared by every delaunch crate.
//!
//! This crate defines the schema layer: identifier newtypes, engine module
//! descriptors, game profiles with their module selections and parameter
//! overrides, serialized game configurations as exchanged with remote peers,
//! and patch descriptions with dependency ordering.

pub mod game;
pub mod module;
pub mod patch;
pub mod profile;
pub mod types;

pub use game::{parse_game_config_str, FileFormat, GameConfig, WindowSize};
pub use module::{compare_versions, ModuleDescriptor, ModuleErrorCode, ModuleStatus, ModuleType};
pub use patch::{sort_patches, PatchInfo};
pub use profile::{parse_module_parameter, ModuleParameters, ModuleSelection, ProfileConfig};
pub use types::{GameId, ModuleName, PatchId, ProfileName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse game configuration: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("game identifier must not be empty")]
    EmptyGameId,
    #[error("game '{0}' does not name a script module")]
    MissingScriptModule(String),
    #[error("invalid module parameter '{0}', expected module:parameter=value")]
    InvalidModuleParameter(String),
}
