use crate::types::{GameId, PatchId};
use serde::{Deserialize, Serialize};

/// A patch overlaying game data.
///
/// `required` lists patches this one builds upon; at least one of them has
/// to be applied first. An empty list means the patch applies to the
/// unpatched game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInfo {
    pub id: PatchId,
    pub game_id: GameId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub required: Vec<PatchId>,
    #[serde(default)]
    pub archive_file: String,
    #[serde(default)]
    pub data_directory: String,
}

impl PatchInfo {
    pub fn new(id: &str, game_id: &str) -> Self {
        Self {
            id: PatchId::new(id),
            game_id: GameId::new(game_id),
            name: String::new(),
            required: Vec::new(),
            archive_file: String::new(),
            data_directory: String::new(),
        }
    }

    #[must_use]
    pub fn requires(mut self, id: &str) -> Self {
        self.required.push(PatchId::new(id));
        self
    }
}

/// Order patches so every patch follows one of its required patches.
///
/// Patches whose requirements can never be met are left out.
pub fn sort_patches(patches: &[PatchInfo]) -> Vec<PatchInfo> {
    let mut sorted: Vec<PatchInfo> = Vec::with_capacity(patches.len());
    let mut added = true;
    while added {
        added = false;
        for patch in patches {
            if sorted.iter().any(|p| p.id == patch.id) {
                continue;
            }
            let satisfied = patch.required.is_empty()
                || patch
                    .required
                    .iter()
                    .any(|req| sorted.iter().any(|p| &p.id == req));
            if satisfied {
                sorted.push(patch.clone());
                added = true;
            }
        }
    }
    sorted
}
