use crate::layout::LauncherLayout;
use crate::{write_atomic, StoreError};
use delaunch_schema::{GameConfig, ProfileConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// A persisted game definition as the launcher last saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub config: GameConfig,
    /// Per-game profile holding module parameter overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_profile: Option<ProfileConfig>,
    pub updated_at: String,
}

/// Game identifiers become file names, so keep them to a safe alphabet.
pub fn validate_game_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.len() > 128 {
        return Err(StoreError::InvalidGameId(
            "game identifier must be 1-128 characters".to_owned(),
        ));
    }
    if id.starts_with('.')
        || !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        return Err(StoreError::InvalidGameId(format!(
            "'{id}' must match [a-zA-Z0-9_.-] and not start with '.'"
        )));
    }
    Ok(())
}

/// Game records stored as one JSON file per game in the launcher games dir.
#[derive(Debug, Clone)]
pub struct GameStore {
    dir: PathBuf,
}

impl GameStore {
    pub fn new(layout: &LauncherLayout) -> Self {
        Self {
            dir: layout.launcher_games_dir(),
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn write(&self, record: &GameRecord) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(record)?;
        write_atomic(&self.path(&record.config.identifier), content.as_bytes())?;
        tracing::debug!("stored game record {}", record.config.identifier);
        Ok(())
    }

    /// Store `config`, replacing any earlier record for the same game.
    /// A previously stored custom profile is kept.
    pub fn put(&self, config: &GameConfig) -> Result<GameRecord, StoreError> {
        config.validate()?;
        validate_game_id(&config.identifier)?;
        let custom_profile = match self.get(&config.identifier) {
            Ok(existing) => existing.custom_profile,
            Err(StoreError::GameNotFound(_)) => None,
            Err(e) => {
                tracing::warn!(
                    "replacing unreadable game record '{}': {e}",
                    config.identifier
                );
                None
            }
        };
        let record = GameRecord {
            config: config.clone(),
            custom_profile,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        self.write(&record)?;
        Ok(record)
    }

    /// Replace or clear the custom profile of a stored game.
    pub fn set_custom_profile(
        &self,
        id: &str,
        profile: Option<&ProfileConfig>,
    ) -> Result<GameRecord, StoreError> {
        let mut record = self.get(id)?;
        record.custom_profile = profile.cloned();
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.write(&record)?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<GameRecord, StoreError> {
        validate_game_id(id)?;
        let path = self.path(id);
        if !path.exists() {
            return Err(StoreError::GameNotFound(id.to_owned()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn exists(&self, id: &str) -> bool {
        validate_game_id(id).is_ok() && self.path(id).exists()
    }

    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        validate_game_id(id)?;
        let path = self.path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// All readable records sorted by identifier. Corrupted files are skipped.
    pub fn list(&self) -> Result<Vec<GameRecord>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match self.get(id) {
                Ok(record) => results.push(record),
                Err(e) => tracing::warn!("skipping unreadable game record '{id}': {e}"),
            }
        }
        results.sort_by(|a, b| a.config.identifier.cmp(&b.config.identifier));
        Ok(results)
    }
}
