use crate::module::ModuleType;
use crate::patch::PatchInfo;
use crate::types::{GameId, ModuleName, PatchId};
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// A file format the game needs some loader module to handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFormat {
    pub module_type: ModuleType,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn is_zero(self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Scale by a display factor given in percent.
    #[must_use]
    pub fn scaled(self, percent: u32) -> Self {
        Self {
            width: self.width * percent / 100,
            height: self.height * percent / 100,
        }
    }
}

/// Serialized game configuration.
///
/// This is both the launcher's persisted game record and the payload a remote
/// peer sends with a start command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub identifier: GameId,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub game_directory: String,
    #[serde(default)]
    pub data_directory: String,
    #[serde(default)]
    pub script_directory: String,
    pub script_module: ModuleName,
    #[serde(default)]
    pub script_module_version: String,
    #[serde(default)]
    pub game_object: String,
    #[serde(default)]
    pub path_config: String,
    #[serde(default)]
    pub path_capture: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub file_formats: Vec<FileFormat>,
    #[serde(default)]
    pub window_size: WindowSize,
    /// Packaged game archive, empty when the game runs from a directory.
    #[serde(default)]
    pub archive_file: String,
    #[serde(default = "default_use_latest_patch")]
    pub use_latest_patch: bool,
    #[serde(default)]
    pub custom_patch: Option<PatchId>,
    #[serde(default)]
    pub patches: Vec<PatchInfo>,
}

fn default_use_latest_patch() -> bool {
    true
}

impl GameConfig {
    pub fn new(identifier: &str, script_module: &str) -> Self {
        Self {
            identifier: GameId::new(identifier),
            alias: String::new(),
            title: String::new(),
            creator: String::new(),
            game_directory: String::new(),
            data_directory: String::new(),
            script_directory: String::new(),
            script_module: ModuleName::new(script_module),
            script_module_version: String::new(),
            game_object: String::new(),
            path_config: String::new(),
            path_capture: String::new(),
            arguments: String::new(),
            file_formats: Vec::new(),
            window_size: WindowSize::default(),
            archive_file: String::new(),
            use_latest_patch: true,
            custom_patch: None,
            patches: Vec::new(),
        }
    }

    /// Title for log lines, falling back to alias and identifier.
    pub fn display_name(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.alias.is_empty() {
            &self.alias
        } else {
            &self.identifier
        }
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.identifier.trim().is_empty() {
            return Err(SchemaError::EmptyGameId);
        }
        if self.script_module.trim().is_empty() {
            return Err(SchemaError::MissingScriptModule(
                self.identifier.to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse and validate a serialized game configuration.
pub fn parse_game_config_str(content: &str) -> Result<GameConfig, SchemaError> {
    let config: GameConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
